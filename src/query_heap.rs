//! Query heap (spec §2 item 9): a thin wrapper over Vulkan query pools, plus
//! an inline variant backed by a storage buffer for implementations or query
//! types where a pool isn't the natural fit.

use ash::vk;

use crate::error::{Result, ValidationError};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueryType {
    Occlusion,
    BinaryOcclusion,
    Timestamp,
    PipelineStatistics,
}

fn vk_query_type(kind: QueryType) -> vk::QueryType {
    match kind {
        QueryType::Occlusion | QueryType::BinaryOcclusion => vk::QueryType::OCCLUSION,
        QueryType::Timestamp => vk::QueryType::TIMESTAMP,
        QueryType::PipelineStatistics => vk::QueryType::PIPELINE_STATISTICS,
    }
}

/// A Vulkan-query-pool-backed heap. Owns a single `VkQueryPool` sized to
/// `count` slots of `query_type`.
pub struct QueryPoolHeap {
    pub vk_pool: vk::QueryPool,
    pub query_type: QueryType,
    pub count: u32,
}

impl QueryPoolHeap {
    pub fn new(vk_pool: vk::QueryPool, query_type: QueryType, count: u32) -> Self {
        QueryPoolHeap { vk_pool, query_type, count }
    }

    pub fn vk_query_type(&self) -> vk::QueryType {
        vk_query_type(self.query_type)
    }

    pub fn check_index(&self, index: u32) -> Result<()> {
        if index >= self.count {
            Err(ValidationError::DescriptorIndexOutOfRange.into())
        } else {
            Ok(())
        }
    }
}

/// Inline query heap: results are written directly into an app-visible
/// storage buffer rather than read back through `vkGetQueryPoolResults`.
/// Used for query types where predication reads the result directly on the
/// GPU timeline without a host round-trip.
pub struct InlineQueryHeap {
    pub query_type: QueryType,
    pub count: u32,
    /// One `u64` result slot per query, doubled for queries that report two
    /// values (e.g. binary occlusion's availability bit).
    results: Vec<u64>,
}

impl InlineQueryHeap {
    pub fn new(query_type: QueryType, count: u32) -> Self {
        InlineQueryHeap {
            query_type,
            count,
            results: vec![0u64; count as usize],
        }
    }

    pub fn check_index(&self, index: u32) -> Result<()> {
        if index >= self.count {
            Err(ValidationError::DescriptorIndexOutOfRange.into())
        } else {
            Ok(())
        }
    }

    pub fn write_result(&mut self, index: u32, value: u64) -> Result<()> {
        self.check_index(index)?;
        self.results[index as usize] = value;
        Ok(())
    }

    pub fn read_result(&self, index: u32) -> Result<u64> {
        self.check_index(index)?;
        Ok(self.results[index as usize])
    }
}
