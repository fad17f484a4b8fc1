// Copyright 2021 Datafuse Labs
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

/// Pixel-aligned bucketing over a time window.
///
/// `delta` re-bases the absolute clock onto a ring of length `size` before
/// the linear scale to `[0, width)`, so two windows of the same duration
/// starting at different absolute times place a point at the same relative
/// offset into the same bucket. Both backend adapters render this exact
/// arithmetic in their own query dialect.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BucketSpec {
    pub size: i64,
    pub delta: i64,
    pub width: i64,
}

impl BucketSpec {
    /// Requires `time_to > time_from` and `width > 0`.
    pub fn new(time_from: i64, time_to: i64, width: i64) -> Self {
        let size = time_to - time_from;
        debug_assert!(size > 0);
        debug_assert!(width > 0);
        let delta = size - time_from.rem_euclid(size);
        Self { size, delta, width }
    }

    /// Bucket index for `clock`, always within `[0, width)`.
    pub fn index(&self, clock: i64) -> i64 {
        self.width * (clock + self.delta).rem_euclid(self.size) / self.size
    }
}
