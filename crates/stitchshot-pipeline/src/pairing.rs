//! Grouping of images into capture pairs by timestamp.
//!
//! Pairing is greedy and order-sensitive: each image, in input order, is
//! paired with the first later image that is still free and whose
//! timestamp is within the tolerance. This is not a globally optimal
//! matching. Given three images all within tolerance of each other, the
//! first two pair up and the third is left over even if it was closer to
//! the second. Existing output layouts depend on that behaviour, so it is
//! kept.

use std::path::{Path, PathBuf};

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};

use crate::metadata::MetadataReader;
use crate::timestamp::{self, Timestamp, TimestampExtractor};

/// Two images to be stitched together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImagePair {
    /// Path that came first in the input listing.
    pub first: PathBuf,
    /// Capture time of `first`.
    pub first_time: Option<Timestamp>,
    /// Its partner.
    pub second: PathBuf,
    /// Capture time of `second`.
    pub second_time: Option<Timestamp>,
}

impl ImagePair {
    /// The pair's paths as `(earlier, later)`.
    ///
    /// See [`timestamp::order`] for how missing timestamps are handled.
    #[must_use]
    pub fn ordered(&self) -> (&Path, &Path) {
        timestamp::order(
            self.first.as_path(),
            self.first_time,
            self.second.as_path(),
            self.second_time,
        )
    }

    /// Time used to name the stitched output.
    ///
    /// The midpoint when both timestamps are known, the single known one
    /// otherwise.
    #[must_use]
    pub fn output_time(&self) -> Option<Timestamp> {
        match (self.first_time, self.second_time) {
            (Some(a), Some(b)) => Some(timestamp::average(a, b)),
            (a, b) => a.or(b),
        }
    }
}

/// Result of pairing a set of paths.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingOutcome {
    /// Pairs in the order their first member appeared.
    pub pairs: Vec<ImagePair>,
    /// Paths left without a partner, in input order.
    pub unpaired: Vec<PathBuf>,
}

/// Pairing expressed as indices into the input slice.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexPairing {
    /// `(i, j)` with `i < j`.
    pub pairs: Vec<(usize, usize)>,
    /// Indices left without a partner, ascending.
    pub unpaired: Vec<usize>,
}

/// Greedily pair timestamps within `tolerance` of each other.
///
/// An absent timestamp is never paired. Every index ends up in exactly
/// one of `pairs` or `unpaired`.
#[must_use]
pub fn pair_timestamps(times: &[Option<Timestamp>], tolerance: TimeDelta) -> IndexPairing {
    let mut taken = vec![false; times.len()];
    let mut result = IndexPairing::default();

    for i in 0..times.len() {
        if taken[i] {
            continue;
        }
        taken[i] = true;

        let Some(anchor) = times[i] else {
            result.unpaired.push(i);
            continue;
        };

        let partner = (i + 1..times.len()).find(|&j| {
            !taken[j] && times[j].is_some_and(|t| timestamp::within_tolerance(anchor, t, tolerance))
        });

        match partner {
            Some(j) => {
                taken[j] = true;
                result.pairs.push((i, j));
            }
            None => result.unpaired.push(i),
        }
    }

    result
}

/// Read each path's capture time and pair the paths.
///
/// Metadata is read once per path, in input order, on the calling thread.
#[must_use]
pub fn pair_paths<R>(
    paths: &[PathBuf],
    reader: &R,
    extractor: &TimestampExtractor,
    tolerance: TimeDelta,
) -> PairingOutcome
where
    R: MetadataReader + ?Sized,
{
    let times: Vec<Option<Timestamp>> = paths
        .iter()
        .map(|path| extractor.extract(reader.read(path).as_ref()))
        .collect();

    let indices = pair_timestamps(&times, tolerance);

    PairingOutcome {
        pairs: indices
            .pairs
            .iter()
            .map(|&(i, j)| ImagePair {
                first: paths[i].clone(),
                first_time: times[i],
                second: paths[j].clone(),
                second_time: times[j],
            })
            .collect(),
        unpaired: indices.unpaired.iter().map(|&i| paths[i].clone()).collect(),
    }
}
