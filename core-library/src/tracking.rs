//! # Field-level change tracking
//!
//! Entities loaded for mutation are wrapped in [`Tracked`], which keeps the
//! loaded snapshot next to the working copy. On commit the caller asks for the
//! changed fields and hands only those to the repository's `update`, so a sync
//! that rewrites identical remote data produces no writes at all.
//!
//! ```ignore
//! let mut episode = Tracked::new(repos.episodes.find_by_id(id).await?.unwrap());
//! episode.title = Some("Pilot".to_string());
//! if let Some(fields) = episode.take_changes() {
//!     repos.episodes.update(&episode, &fields).await?;
//! }
//! ```

use crate::models::{Episode, ErrorLogEntry, Recording, RemoteEpisodeRecord, Series};
use std::fmt::Debug;
use std::ops::{Deref, DerefMut};

/// An entity whose persisted fields can be compared one by one
pub trait Diffable: Clone {
    /// Names one persisted field
    type Field: Copy + Eq + Debug + Send + Sync + 'static;

    /// Fields whose value differs between `self` and `baseline`
    fn diff(&self, baseline: &Self) -> Vec<Self::Field>;

    /// Copy the listed fields from `source` onto `self`
    fn copy_fields(&mut self, source: &Self, fields: &[Self::Field]);
}

/// Working copy of an entity plus the snapshot it was loaded as
#[derive(Debug, Clone)]
pub struct Tracked<T: Diffable> {
    baseline: T,
    current: T,
}

impl<T: Diffable> Tracked<T> {
    /// Start tracking an entity as loaded from storage
    pub fn new(entity: T) -> Self {
        Self {
            baseline: entity.clone(),
            current: entity,
        }
    }

    pub fn baseline(&self) -> &T {
        &self.baseline
    }

    pub fn changed_fields(&self) -> Vec<T::Field> {
        self.current.diff(&self.baseline)
    }

    pub fn is_dirty(&self) -> bool {
        !self.changed_fields().is_empty()
    }

    /// Changed fields, or `None` when nothing changed; the current state
    /// becomes the new baseline either way.
    pub fn take_changes(&mut self) -> Option<Vec<T::Field>> {
        let fields = self.changed_fields();
        self.baseline = self.current.clone();
        if fields.is_empty() {
            None
        } else {
            Some(fields)
        }
    }

    pub fn into_inner(self) -> T {
        self.current
    }
}

impl<T: Diffable> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.current
    }
}

impl<T: Diffable> DerefMut for Tracked<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.current
    }
}

/// Generates a field enum plus its `Diffable` impl from a field list
macro_rules! diffable {
    ($entity:ty, $field_enum:ident { $($variant:ident => $field:ident),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $field_enum {
            $($variant),+
        }

        impl Diffable for $entity {
            type Field = $field_enum;

            fn diff(&self, baseline: &Self) -> Vec<$field_enum> {
                let mut changed = Vec::new();
                $(
                    if self.$field != baseline.$field {
                        changed.push($field_enum::$variant);
                    }
                )+
                changed
            }

            fn copy_fields(&mut self, source: &Self, fields: &[$field_enum]) {
                for field in fields {
                    match field {
                        $($field_enum::$variant => self.$field = source.$field.clone(),)+
                    }
                }
            }
        }
    };
}

diffable!(Series, SeriesField {
    Title => title,
    RemoteSeriesId => remote_series_id,
    RemoteTitleHint => remote_title_hint,
    IgnoreRemoteMatch => ignore_remote_match,
    NeedsRematch => needs_rematch,
    MatchedWrong => matched_wrong,
    Counters => counters,
    LastError => last_error,
    ConsecutiveErrors => consecutive_errors,
    LastFailureAt => last_failure_at,
    UpdatedAt => updated_at,
});

diffable!(Episode, EpisodeField {
    SeasonNumber => season_number,
    EpisodeNumber => episode_number,
    AbsoluteNumber => absolute_number,
    AirDate => air_date,
    Title => title,
    RecordingId => recording_id,
    RemoteEpisodeId => remote_episode_id,
    Retired => retired,
    UpdatedAt => updated_at,
});

diffable!(Recording, RecordingField {
    DeletedAt => deleted_at,
    Watched => watched,
});

diffable!(RemoteEpisodeRecord, RemoteEpisodeField {
    RemoteSeriesId => remote_series_id,
    SeasonNumber => season_number,
    EpisodeNumber => episode_number,
    AbsoluteNumber => absolute_number,
    Title => title,
    FirstAired => first_aired,
    LastUpdated => last_updated,
    Retired => retired,
});

diffable!(ErrorLogEntry, ErrorLogField {
    AttemptedTitle => attempted_title,
    CandidateName => candidate_name,
    ChosenName => chosen_name,
    FailureDetail => failure_detail,
    Resolved => resolved,
    ResolvedAt => resolved_at,
    Ignore => ignore,
    Occurrences => occurrences,
    LastSeenAt => last_seen_at,
});
