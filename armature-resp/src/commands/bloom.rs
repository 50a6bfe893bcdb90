//! Probabilistic data structure commands (bloom, cuckoo, count-min sketch, top-k).

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use super::{
    Command, CommandArgs, transform_boolean_reply, transform_integer_array_reply,
    transform_ok_reply,
};
use crate::error::{RespError, RespResult};
use crate::value::Value;

// ============================================================================
// Bloom
// ============================================================================

/// `BF.EXISTS key item`
#[derive(Debug, Clone)]
pub struct BfExists {
    key: Bytes,
    item: Bytes,
}

impl BfExists {
    /// Check whether `item` may be in the filter at `key`.
    pub fn new(key: impl AsRef<[u8]>, item: impl AsRef<[u8]>) -> Self {
        Self {
            key: Bytes::copy_from_slice(key.as_ref()),
            item: Bytes::copy_from_slice(item.as_ref()),
        }
    }
}

impl Command for BfExists {
    type Output = bool;

    const FIRST_KEY_INDEX: usize = 1;
    const IS_READ_ONLY: bool = true;

    fn args(&self) -> CommandArgs {
        CommandArgs::new("BF.EXISTS").arg(&self.key).arg(&self.item)
    }

    fn transform_reply(reply: Value) -> RespResult<bool> {
        transform_boolean_reply(reply)
    }
}

// ============================================================================
// Cuckoo
// ============================================================================

/// `CF.LOADCHUNK key iterator data`
#[derive(Debug, Clone)]
pub struct CfLoadChunk {
    key: Bytes,
    iterator: i64,
    data: Bytes,
}

impl CfLoadChunk {
    /// Restore one chunk previously produced by `CF.SCANDUMP`.
    pub fn new(key: impl AsRef<[u8]>, iterator: i64, data: impl AsRef<[u8]>) -> Self {
        Self {
            key: Bytes::copy_from_slice(key.as_ref()),
            iterator,
            data: Bytes::copy_from_slice(data.as_ref()),
        }
    }
}

impl Command for CfLoadChunk {
    type Output = ();

    const FIRST_KEY_INDEX: usize = 1;

    fn args(&self) -> CommandArgs {
        CommandArgs::new("CF.LOADCHUNK")
            .arg(&self.key)
            .arg_display(self.iterator)
            .arg(&self.data)
    }

    fn transform_reply(reply: Value) -> RespResult<()> {
        transform_ok_reply(reply)
    }
}

/// `CF.INFO key`
#[derive(Debug, Clone)]
pub struct CfInfo {
    key: Bytes,
}

impl CfInfo {
    /// Describe the cuckoo filter at `key`.
    pub fn new(key: impl AsRef<[u8]>) -> Self {
        Self {
            key: Bytes::copy_from_slice(key.as_ref()),
        }
    }
}

/// Shaped `CF.INFO` reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CuckooInfo {
    /// Memory used, in bytes
    pub size: i64,
    /// Number of buckets
    pub number_of_buckets: i64,
    /// Number of sub-filters
    pub number_of_filters: i64,
    /// Items inserted so far
    pub number_of_inserted_items: i64,
    /// Items deleted so far
    pub number_of_deleted_items: i64,
    /// Items per bucket
    pub bucket_size: i64,
    /// Growth factor for new sub-filters
    pub expansion_rate: i64,
    /// Maximum swaps before declaring the filter full
    pub max_iteration: i64,
}

impl Command for CfInfo {
    type Output = CuckooInfo;

    const FIRST_KEY_INDEX: usize = 1;
    const IS_READ_ONLY: bool = true;

    fn args(&self) -> CommandArgs {
        CommandArgs::new("CF.INFO").arg(&self.key)
    }

    fn transform_reply(reply: Value) -> RespResult<CuckooInfo> {
        let items = reply
            .into_array()
            .map_err(|other| RespError::unexpected("array", other))?;

        let mut info = CuckooInfo::default();
        for pair in items.chunks(2) {
            let [name, value] = pair else {
                return Err(RespError::unexpected("field/value pairs", pair));
            };
            let (Some(name), Some(value)) = (name.as_str(), value.as_integer()) else {
                return Err(RespError::unexpected("named integer field", pair));
            };

            let slot = match name {
                "Size" => &mut info.size,
                "Number of buckets" => &mut info.number_of_buckets,
                "Number of filters" => &mut info.number_of_filters,
                "Number of items inserted" => &mut info.number_of_inserted_items,
                "Number of items deleted" => &mut info.number_of_deleted_items,
                "Bucket size" => &mut info.bucket_size,
                "Expansion rate" => &mut info.expansion_rate,
                "Max iterations" => &mut info.max_iteration,
                _ => continue,
            };
            *slot = value;
        }

        Ok(info)
    }
}

// ============================================================================
// Count-Min Sketch
// ============================================================================

/// `CMS.MERGE destination numKeys source [source ...] [WEIGHTS weight [weight ...]]`
#[derive(Debug, Clone)]
pub struct CmsMerge {
    destination: Bytes,
    sources: Vec<Bytes>,
    weights: Option<Vec<i64>>,
}

impl CmsMerge {
    /// Merge `sources` into `destination`.
    pub fn new<I, S>(destination: impl AsRef<[u8]>, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        Self {
            destination: Bytes::copy_from_slice(destination.as_ref()),
            sources: sources
                .into_iter()
                .map(|s| Bytes::copy_from_slice(s.as_ref()))
                .collect(),
            weights: None,
        }
    }

    /// Weight each source sketch, in source order.
    pub fn with_weights(mut self, weights: impl IntoIterator<Item = i64>) -> Self {
        self.weights = Some(weights.into_iter().collect());
        self
    }
}

impl Command for CmsMerge {
    type Output = ();

    const FIRST_KEY_INDEX: usize = 1;

    fn args(&self) -> CommandArgs {
        let mut args = CommandArgs::new("CMS.MERGE")
            .arg(&self.destination)
            .arg_display(self.sources.len())
            .args(&self.sources);

        if let Some(weights) = &self.weights {
            args = args.arg("WEIGHTS");
            for weight in weights {
                args = args.arg_display(weight);
            }
        }
        args
    }

    fn transform_reply(reply: Value) -> RespResult<()> {
        transform_ok_reply(reply)
    }
}

// ============================================================================
// Top-K
// ============================================================================

/// `TOPK.COUNT key item [item ...]`
#[derive(Debug, Clone)]
pub struct TopKCount {
    key: Bytes,
    items: Vec<Bytes>,
}

impl TopKCount {
    /// Count estimates for `items` in the top-k at `key`.
    pub fn new<I, S>(key: impl AsRef<[u8]>, items: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        Self {
            key: Bytes::copy_from_slice(key.as_ref()),
            items: items
                .into_iter()
                .map(|s| Bytes::copy_from_slice(s.as_ref()))
                .collect(),
        }
    }
}

impl Command for TopKCount {
    type Output = Vec<i64>;

    const FIRST_KEY_INDEX: usize = 1;

    fn args(&self) -> CommandArgs {
        CommandArgs::new("TOPK.COUNT").arg(&self.key).args(&self.items)
    }

    fn transform_reply(reply: Value) -> RespResult<Vec<i64>> {
        transform_integer_array_reply(reply)
    }
}
