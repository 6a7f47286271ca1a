//! Random next-track picks
//!
//! Unlike a shuffled playlist, the transport never materializes a permutation:
//! each skip draws uniformly from a candidate pool minus the current track.

use crate::types::{TrackId, TrackRef};
use rand::Rng;

/// Pick uniformly among `candidates` other than `current`
///
/// Returns the current track only when it is the sole candidate, and `None`
/// for an empty pool.
pub fn pick_other<R: Rng + ?Sized>(
    candidates: &[TrackRef],
    current: Option<&TrackId>,
    rng: &mut R,
) -> Option<TrackRef> {
    if candidates.is_empty() {
        return None;
    }

    let excluded = current.and_then(|id| candidates.iter().position(|t| &t.id == id));

    match excluded {
        Some(_) if candidates.len() == 1 => Some(candidates[0].clone()),
        Some(skip) => {
            // Draw from n-1 slots and step over the excluded one
            let mut index = rng.gen_range(0..candidates.len() - 1);
            if index >= skip {
                index += 1;
            }
            Some(candidates[index].clone())
        }
        None => Some(candidates[rng.gen_range(0..candidates.len())].clone()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Track;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::collections::HashSet;
    use std::sync::Arc;

    fn tracks(n: usize) -> Vec<TrackRef> {
        (0..n)
            .map(|i| Arc::new(Track::new(format!("t{i}"), format!("/music/{i}.flac"))))
            .collect()
    }

    #[test]
    fn never_picks_current_when_alternatives_exist() {
        let pool = tracks(5);
        let current = pool[2].id.clone();
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..1000 {
            let pick = pick_other(&pool, Some(&current), &mut rng).unwrap();
            assert_ne!(pick.id, current);
        }
    }

    #[test]
    fn reaches_every_other_track() {
        let pool = tracks(5);
        let current = pool[0].id.clone();
        let mut rng = StdRng::seed_from_u64(11);

        let seen: HashSet<TrackId> = (0..500)
            .map(|_| pick_other(&pool, Some(&current), &mut rng).unwrap().id.clone())
            .collect();
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn single_track_pool_returns_it() {
        let pool = tracks(1);
        let current = pool[0].id.clone();
        let mut rng = StdRng::seed_from_u64(1);

        let pick = pick_other(&pool, Some(&current), &mut rng).unwrap();
        assert_eq!(pick.id, current);
    }

    #[test]
    fn empty_pool() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(pick_other(&[], None, &mut rng).is_none());
    }

    #[test]
    fn current_outside_pool_draws_from_everything() {
        let pool = tracks(3);
        let stranger = TrackId::new("elsewhere");
        let mut rng = StdRng::seed_from_u64(3);

        let seen: HashSet<TrackId> = (0..300)
            .map(|_| pick_other(&pool, Some(&stranger), &mut rng).unwrap().id.clone())
            .collect();
        assert_eq!(seen.len(), 3);
    }
}
