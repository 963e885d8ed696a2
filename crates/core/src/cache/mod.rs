// Copyright © 2026 Cascade Contributors
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

pub mod backend;
pub mod classifier;
pub mod events;
pub mod fallback;
pub mod manager;
pub(crate) mod memory_backend;
pub(crate) mod redis_backend;

// Public API - the facade, its manager, and the tier backends/managers
pub use backend::{CacheBackend, CacheBackendManager, Loader};
pub use classifier::is_infrastructure_failure;
pub use events::{CacheOperation, DegradeEvent, DegradeEventBus};
pub use fallback::{FallbackCache, FallbackMetricsSnapshot};
pub use manager::FallbackCacheManager;
pub use memory_backend::{MemoryBackendManager, MemoryCacheBackend};
pub use redis_backend::{RedisBackendManager, RedisCacheBackend, RedisTierMetricsSnapshot};
