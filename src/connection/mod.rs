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

//! Connection abstractions and decorators.
//!
//! The [`Connection`] trait is the seam between framing and the actual
//! byte stream. [`BufferedConnection`] decorates any connection with
//! write coalescing; [`MemoryConnection`] is an in-process implementation
//! for tests.

mod buffered;
mod error;
mod memory;
mod traits;

pub use buffered::{BufferedConnection, DEFAULT_BUFFER_SIZE, DEFAULT_FLUSH_DELAY};
pub use error::ConnectionError;
pub use memory::{MemoryConnection, MemoryControls, WriteCall};
pub use traits::Connection;
