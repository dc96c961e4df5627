//
// Copyright 2026 Hans W. Uhlig. All Rights Reserved.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//

//! Connection pooling with idle and lease eviction.
//!
//! [`IdleConnectionPool`] manages the idle set for a single destination;
//! [`EndpointPool`] maps destination keys to idle pools and enforces
//! per-destination capacity. Both are driven by [`PoolConfig`].

mod config;
mod endpoint_pool;
mod error;
mod idle_pool;

pub use config::PoolConfig;
pub use endpoint_pool::{EndpointPool, Take, TakeResult};
pub use error::PoolError;
pub use idle_pool::{IdleConnectionPool, PooledConnection, PooledHandle};
