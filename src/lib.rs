// Copyright 2016 The Gfx-rs Developers.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Core resource, bindless-descriptor-heap and presentation subsystems for
//! a D3D12-over-Vulkan runtime, built directly on `ash`.
//!
//! This crate does not own device creation, command recording or pipeline
//! state; it provides the shared data structures and algorithms those
//! layers build on: an open-addressing hash map, a reader/writer spinlock,
//! the DXGI format catalog, resource/view/descriptor-heap management, the
//! device-global sampler cache, query heaps, memory-topology introspection,
//! the swapchain presentation engine, and (behind the `profiler` feature)
//! a per-PSO timestamp profiler.

pub mod config;
pub mod descriptor_heap;
pub mod descriptor_writer;
pub mod error;
pub mod format;
pub mod hash;
pub mod hash_map;
pub mod memory_info;
#[cfg(feature = "profiler")]
pub mod profiler;
pub mod query_heap;
pub mod resource;
pub mod rw_spinlock;
pub mod sampler_cache;
pub mod swapchain;
pub mod view;
pub mod view_key;

pub use config::RuntimeConfig;
pub use error::{ApiError, Result, ValidationError};
pub use format::{DxgiFormat, FormatInfo};
pub use resource::{Resource, ResourceDesc};
pub use swapchain::Swapchain;
pub use view::{View, ViewMap};
