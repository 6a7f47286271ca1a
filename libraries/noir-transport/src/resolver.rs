//! Next/previous track resolution
//!
//! Pure functions over a snapshot of transport state. Precedence for "next":
//!
//! 1. explicit queue front
//! 2. album shuffle (current track must belong to a multi-track context)
//! 3. library shuffle
//! 4. next track in the context
//! 5. context wrap-around under Repeat All
//! 6. global library order (wrapping under Repeat All) when there is no usable context
//!
//! Anything else resolves to nothing and playback stops.

use crate::queue::Queue;
use crate::shuffle::pick_other;
use crate::types::{Library, PlaybackContext, RepeatMode, ShuffleMode, TrackRef};
use rand::Rng;

/// Which rule produced the next track
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextSource {
    Queue,
    AlbumShuffle,
    LibraryShuffle,
    Sequential,
    Wrap,
    Library,
}

/// Result of a resolution
#[derive(Debug, Clone)]
pub struct NextTrack {
    pub track: TrackRef,
    pub context: Option<PlaybackContext>,
    pub source: NextSource,
}

/// Borrowed view of everything resolution depends on
#[derive(Debug, Clone, Copy)]
pub struct Resolution<'a> {
    pub current: Option<&'a TrackRef>,
    pub context: Option<&'a PlaybackContext>,
    pub queue: &'a Queue,
    pub library: &'a Library,
    pub shuffle: ShuffleMode,
    pub repeat: RepeatMode,
}

impl Resolution<'_> {
    /// Context usable for sequencing: set and containing the current track
    fn member_context(&self) -> Option<(&PlaybackContext, usize)> {
        let current = self.current?;
        let context = self.context?;
        context.position_of(&current.id).map(|i| (context, i))
    }

    fn library_context(&self, track: &TrackRef) -> Option<PlaybackContext> {
        self.library.container_of(track).cloned()
    }

    /// Resolve the track `skip_next` should play
    ///
    /// Does not consume the queue; the caller pops the front when it acts on a
    /// [`NextSource::Queue`] result.
    pub fn next<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<NextTrack> {
        if let Some(track) = self.queue.front() {
            return Some(NextTrack {
                track: track.clone(),
                context: None,
                source: NextSource::Queue,
            });
        }

        let current_id = self.current.map(|t| &t.id);
        let member = self.member_context();

        if self.shuffle == ShuffleMode::Album {
            if let Some((context, _)) = member.filter(|(c, _)| c.len() > 1) {
                if let Some(track) = pick_other(&context.tracks, current_id, rng) {
                    return Some(NextTrack {
                        track,
                        context: Some(context.clone()),
                        source: NextSource::AlbumShuffle,
                    });
                }
            }
        }

        if self.shuffle == ShuffleMode::Library && self.library.len() > 1 {
            if let Some(track) = pick_other(self.library.tracks(), current_id, rng) {
                return Some(NextTrack {
                    context: self.library_context(&track),
                    track,
                    source: NextSource::LibraryShuffle,
                });
            }
        }

        if let Some((context, index)) = member {
            if let Some(track) = context.tracks.get(index + 1) {
                return Some(NextTrack {
                    track: track.clone(),
                    context: Some(context.clone()),
                    source: NextSource::Sequential,
                });
            }
            if self.repeat == RepeatMode::All {
                return context.tracks.first().map(|track| NextTrack {
                    track: track.clone(),
                    context: Some(context.clone()),
                    source: NextSource::Wrap,
                });
            }
            return None;
        }

        let index = self.library.position_of(current_id?)?;
        let track = match self.library.get(index + 1) {
            Some(track) => track,
            None if self.repeat == RepeatMode::All => self.library.get(0)?,
            None => return None,
        };
        Some(NextTrack {
            context: self.library_context(track),
            track: track.clone(),
            source: NextSource::Library,
        })
    }

    /// Track before the current one in context (or library) order
    pub fn previous(&self) -> Option<NextTrack> {
        if let Some((context, index)) = self.member_context() {
            let track = context.tracks.get(index.checked_sub(1)?)?;
            return Some(NextTrack {
                track: track.clone(),
                context: Some(context.clone()),
                source: NextSource::Sequential,
            });
        }

        let index = self.library.position_of(&self.current?.id)?;
        let track = self.library.get(index.checked_sub(1)?)?;
        Some(NextTrack {
            context: self.library_context(track),
            track: track.clone(),
            source: NextSource::Library,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Container, ContainerId, ContainerRef, Track};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn album(id: &str, n: usize) -> ContainerRef {
        let cid = ContainerId::new(id);
        let tracks = (0..n)
            .map(|i| {
                Arc::new(
                    Track::new(format!("{id}{i}"), format!("/music/{id}/{i}.flac"))
                        .in_container(cid.clone()),
                )
            })
            .collect();
        Arc::new(Container::new(cid, id, tracks))
    }

    struct Fixture {
        library: Library,
        x: ContainerRef,
        queue: Queue,
    }

    impl Fixture {
        fn new() -> Self {
            let x = album("x", 3);
            let y = album("y", 2);
            Self {
                library: Library::from_containers(vec![x.clone(), y]),
                x,
                queue: Queue::new(),
            }
        }

        fn at<'a>(&'a self, current: &'a TrackRef, context: Option<&'a PlaybackContext>) -> Resolution<'a> {
            Resolution {
                current: Some(current),
                context,
                queue: &self.queue,
                library: &self.library,
                shuffle: ShuffleMode::Off,
                repeat: RepeatMode::Off,
            }
        }
    }

    fn rng() -> StdRng {
        StdRng::seed_from_u64(42)
    }

    #[test]
    fn sequential_within_album() {
        let f = Fixture::new();
        let a = f.x.tracks[0].clone();
        let next = f.at(&a, Some(&f.x)).next(&mut rng()).unwrap();

        assert_eq!(next.track.id.as_str(), "x1");
        assert_eq!(next.source, NextSource::Sequential);
        assert!(Arc::ptr_eq(next.context.as_ref().unwrap(), &f.x));
    }

    #[test]
    fn album_end_stops_without_repeat() {
        let f = Fixture::new();
        let c = f.x.tracks[2].clone();
        assert!(f.at(&c, Some(&f.x)).next(&mut rng()).is_none());
    }

    #[test]
    fn album_end_wraps_with_repeat_all() {
        let f = Fixture::new();
        let c = f.x.tracks[2].clone();
        let mut res = f.at(&c, Some(&f.x));
        res.repeat = RepeatMode::All;

        let next = res.next(&mut rng()).unwrap();
        assert_eq!(next.track.id.as_str(), "x0");
        assert_eq!(next.source, NextSource::Wrap);
    }

    #[test]
    fn queue_beats_everything() {
        let mut f = Fixture::new();
        let queued = Arc::new(Track::new("q", "/music/q.flac"));
        f.queue.enqueue(queued);
        let a = f.x.tracks[0].clone();
        let mut res = f.at(&a, Some(&f.x));
        res.shuffle = ShuffleMode::Library;
        res.repeat = RepeatMode::All;

        let next = res.next(&mut rng()).unwrap();
        assert_eq!(next.track.id.as_str(), "q");
        assert_eq!(next.source, NextSource::Queue);
        assert!(next.context.is_none());
    }

    #[test]
    fn album_shuffle_needs_membership() {
        let f = Fixture::new();
        let stranger = Arc::new(Track::new("s", "/music/s.flac"));
        let mut res = f.at(&stranger, Some(&f.x));
        res.shuffle = ShuffleMode::Album;

        // Not in the context and not in the library: nothing to do
        assert!(res.next(&mut rng()).is_none());
    }

    #[test]
    fn library_shuffle_adopts_pick_container() {
        let f = Fixture::new();
        let a = f.x.tracks[0].clone();
        let mut res = f.at(&a, Some(&f.x));
        res.shuffle = ShuffleMode::Library;

        let mut rng = rng();
        for _ in 0..50 {
            let next = res.next(&mut rng).unwrap();
            assert_ne!(next.track.id, a.id);
            assert_eq!(next.source, NextSource::LibraryShuffle);
            assert_eq!(
                next.context.unwrap().id,
                next.track.container.clone().unwrap()
            );
        }
    }

    #[test]
    fn global_order_without_context() {
        let f = Fixture::new();
        let x2 = f.x.tracks[2].clone();
        let next = f.at(&x2, None).next(&mut rng()).unwrap();

        assert_eq!(next.track.id.as_str(), "y0");
        assert_eq!(next.source, NextSource::Library);
    }

    #[test]
    fn global_order_wraps_with_repeat_all() {
        let f = Fixture::new();
        let last = f.library.get(4).unwrap().clone();
        let mut res = f.at(&last, None);
        assert!(res.next(&mut rng()).is_none());

        res.repeat = RepeatMode::All;
        assert_eq!(res.next(&mut rng()).unwrap().track.id.as_str(), "x0");
    }

    #[test]
    fn previous_steps_back_in_context() {
        let f = Fixture::new();
        let b = f.x.tracks[1].clone();
        assert_eq!(f.at(&b, Some(&f.x)).previous().unwrap().track.id.as_str(), "x0");

        let a = f.x.tracks[0].clone();
        assert!(f.at(&a, Some(&f.x)).previous().is_none());
    }
}
