//! Consistent Hash Partitioner
//!
//! Maps message keys onto topic partitions. Every message for one catalog
//! item shares a key, so it always lands on the same partition and keeps
//! its per-item order.
//!
//! ## Time Complexity
//! - Get partition: O(log n) where n = num_partitions * virtual_nodes
//! - Build ring: O(n log n) for initial setup

use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};

use siphasher::sip::SipHasher24;

/// Consistent hash ring for partition assignment
#[derive(Debug, Clone)]
pub struct ConsistentHashPartitioner {
    /// Hash ring mapping hash values to partitions
    ring: BTreeMap<u64, usize>,
    num_partitions: usize,
}

impl ConsistentHashPartitioner {
    /// Virtual nodes per partition for better distribution
    const VIRTUAL_NODES: usize = 150;

    pub fn new(num_partitions: usize) -> Self {
        let num_partitions = num_partitions.max(1);
        let mut ring = BTreeMap::new();

        for partition in 0..num_partitions {
            for vnode in 0..Self::VIRTUAL_NODES {
                let hash = Self::hash_key(&format!("partition-{}-vnode-{}", partition, vnode));
                ring.insert(hash, partition);
            }
        }

        Self {
            ring,
            num_partitions,
        }
    }

    fn hash_key(key: &str) -> u64 {
        let mut hasher = SipHasher24::new();
        key.hash(&mut hasher);
        hasher.finish()
    }

    /// Partition for `key`: the first ring entry at or after the key's hash,
    /// wrapping around to the start of the ring.
    pub fn get_partition(&self, key: &str) -> usize {
        let hash = Self::hash_key(key);
        self.ring
            .range(hash..)
            .next()
            .or_else(|| self.ring.iter().next())
            .map(|(_, &partition)| partition)
            .unwrap_or(0)
    }

    pub fn num_partitions(&self) -> usize {
        self.num_partitions
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_same_key_same_partition() {
        let partitioner = ConsistentHashPartitioner::new(3);
        let key = "65a1f0c2e4b0a1b2c3d4e5f6";
        let partition = partitioner.get_partition(key);
        assert_eq!(partition, partitioner.get_partition(key));
        assert!(partition < 3);
    }

    #[test]
    fn test_distribution() {
        let partitioner = ConsistentHashPartitioner::new(6);
        let mut counts: HashMap<usize, usize> = HashMap::new();

        for i in 0..1000 {
            let partition = partitioner.get_partition(&format!("coin-{}", i));
            *counts.entry(partition).or_insert(0) += 1;
        }

        for partition in 0..6 {
            let count = counts.get(&partition).copied().unwrap_or(0);
            assert!(count > 50, "Partition {} has only {} keys", partition, count);
        }
    }

    #[test]
    fn test_zero_partitions_clamped() {
        let partitioner = ConsistentHashPartitioner::new(0);
        assert_eq!(partitioner.num_partitions(), 1);
        assert_eq!(partitioner.get_partition("anything"), 0);
    }
}
