//! Region growing from seed matches.
//!
//! Growth runs in synchronous waves. Every match accepted in the previous
//! wave proposes matches for its neighbours against the claim masks as they
//! stood at the start of the wave. Proposals are then ranked by score, with
//! pixel indices breaking ties, and claimed one at a time; a proposal whose
//! left or right pixel was taken by a better one is dropped. The result does
//! not depend on thread scheduling.
//!
//! Ordering is best-first within a wave only. A single global priority queue
//! would let a strong match found late displace a weaker one accepted in an
//! earlier wave; here claims are final once made.

use crate::matcher::{Claims, Matcher, PixelMatch};
use log::debug;
use std::cmp::Ordering;

#[cfg(feature = "rayon")]
use rayon::prelude::*;

fn rank(a: &PixelMatch, b: &PixelMatch) -> Ordering {
    b.score
        .total_cmp(&a.score)
        .then(a.left.cmp(&b.left))
        .then(a.right.cmp(&b.right))
}

/// Claim the proposals in rank order and keep the ones that succeed.
fn resolve(claims: &Claims, mut proposals: Vec<PixelMatch>) -> Vec<PixelMatch> {
    proposals.sort_by(rank);
    proposals.retain(|m| claims.claim(m));
    proposals
}

/// Grow `seeds` into a one-to-one set of matches.
pub(crate) fn propagate(matcher: &Matcher<'_>, claims: &Claims, seeds: Vec<PixelMatch>) -> Vec<PixelMatch> {
    let mut frontier = resolve(claims, seeds);
    let mut accepted = Vec::new();
    let mut waves = 0usize;

    while !frontier.is_empty() {
        accepted.extend_from_slice(&frontier);

        #[cfg(feature = "rayon")]
        let proposals: Vec<PixelMatch> = frontier
            .par_iter()
            .flat_map_iter(|m| matcher.propose(m, claims))
            .collect();
        #[cfg(not(feature = "rayon"))]
        let proposals: Vec<PixelMatch> = frontier
            .iter()
            .flat_map(|m| matcher.propose(m, claims))
            .collect();

        frontier = resolve(claims, proposals);
        waves += 1;
    }

    debug!("grew {} matches in {} waves", accepted.len(), waves);
    accepted
}
