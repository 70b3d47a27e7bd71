use crate::error::ControllerError;
use crate::listener::ControllerListener;
use crate::threshold::{replay_target, scrobble_threshold};
use crate::timer::IntervalTimer;
use scrobble_bridge_core::{Mode, ScrobbleOptions, Snapshot, Song, UserEdits};
use scrobble_bridge_services::{aggregate, failed_services, Aggregate, Enricher, ServiceRoster, Storage};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq)]
pub struct ControllerOptions {
    pub scrobble_percent: u8,
    pub max_scrobble: Duration,
    pub scrobble_podcasts: bool,
    pub replay_window: Duration,
}

impl ControllerOptions {
    pub fn from_scrobble_options(opts: &ScrobbleOptions) -> Self {
        Self {
            scrobble_percent: opts.percent.min(100),
            max_scrobble: Duration::from_secs(opts.max_scrobble_secs),
            scrobble_podcasts: opts.scrobble_podcasts,
            replay_window: Duration::from_secs(opts.replay_window_secs),
        }
    }

    fn threshold(&self, duration: Option<f64>) -> Option<Duration> {
        scrobble_threshold(duration, self.scrobble_percent, self.max_scrobble)
    }
}

impl Default for ControllerOptions {
    fn default() -> Self {
        Self::from_scrobble_options(&ScrobbleOptions::default())
    }
}

/// Point-in-time view of the controller, for status output.
#[derive(Debug, Clone, Serialize)]
pub struct ControllerStatus {
    pub enabled: bool,
    pub mode: Mode,
    pub generation: u64,
    pub song: Option<Song>,
    pub scrobble_elapsed_secs: f64,
    pub scrobble_remaining_secs: Option<f64>,
}

enum Notice {
    Mode(Mode),
    SongUpdated(Option<Song>),
    NowPlaying(Song),
}

/// Follow-up work that has to run after the state lock is released.
enum Next {
    Nothing,
    Enrich { generation: u64, pass: u64 },
    NowPlaying { generation: u64 },
}

struct State {
    options: ControllerOptions,
    enabled: bool,
    mode: Mode,
    song: Option<Song>,
    /// Stamp of the most recently created song.
    generation: u64,
    /// Bumped on every enrichment run so a re-run supersedes one in flight.
    enrich_pass: u64,
    notices: Vec<Notice>,
}

impl State {
    fn set_mode(&mut self, mode: Mode) {
        if self.mode == mode {
            return;
        }
        debug!(from = %self.mode, to = %mode, "mode transition");
        self.mode = mode;
        self.notices.push(Notice::Mode(mode));
    }

    fn song_updated(&mut self) {
        let song = self.song.clone();
        self.notices.push(Notice::SongUpdated(song));
    }

    /// The current song, only if it is still the one stamped `generation`.
    fn song_mut(&mut self, generation: u64) -> Option<&mut Song> {
        self.song.as_mut().filter(|s| s.generation() == generation)
    }
}

struct Shared {
    state: Mutex<State>,
    dispatch: Mutex<()>,
    scrobble_timer: IntervalTimer,
    replay_timer: IntervalTimer,
    enricher: Arc<dyn Enricher>,
    roster: ServiceRoster,
    storage: Arc<dyn Storage>,
    listener: Box<dyn ControllerListener>,
}

/// Drives one playback session from snapshots to a scrobble decision.
///
/// The handle is cheap to clone. State lives behind a mutex that is never held
/// across an `.await`: enrichment and service calls work on a copy of the
/// song, and every commit afterwards re-checks the song's generation stamp so
/// results for a superseded song are dropped.
#[derive(Clone)]
pub struct Controller {
    shared: Arc<Shared>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Controller {
    pub fn new(
        options: ControllerOptions,
        enricher: Arc<dyn Enricher>,
        roster: ServiceRoster,
        storage: Arc<dyn Storage>,
        listener: Box<dyn ControllerListener>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State {
                    options,
                    enabled: true,
                    mode: Mode::Base,
                    song: None,
                    generation: 0,
                    enrich_pass: 0,
                    notices: Vec::new(),
                }),
                dispatch: Mutex::new(()),
                scrobble_timer: IntervalTimer::new(),
                replay_timer: IntervalTimer::new(),
                enricher,
                roster,
                storage,
                listener,
            }),
        }
    }

    pub fn mode(&self) -> Mode {
        lock(&self.shared.state).mode
    }

    pub fn is_enabled(&self) -> bool {
        lock(&self.shared.state).enabled
    }

    pub fn current_song(&self) -> Option<Song> {
        lock(&self.shared.state).song.clone()
    }

    pub fn generation(&self) -> u64 {
        lock(&self.shared.state).generation
    }

    pub fn scrobble_elapsed(&self) -> Duration {
        self.shared.scrobble_timer.elapsed()
    }

    pub fn replay_elapsed(&self) -> Duration {
        self.shared.replay_timer.elapsed()
    }

    pub fn status(&self) -> ControllerStatus {
        let st = lock(&self.shared.state);
        ControllerStatus {
            enabled: st.enabled,
            mode: st.mode,
            generation: st.generation,
            song: st.song.clone(),
            scrobble_elapsed_secs: self.shared.scrobble_timer.elapsed().as_secs_f64(),
            scrobble_remaining_secs: self.shared.scrobble_timer.remaining().map(|d| d.as_secs_f64()),
        }
    }

    /// New options apply to the next retarget; running timers keep their targets.
    pub fn update_options(&self, options: ControllerOptions) {
        self.with_state(|st| st.options = options);
    }

    pub fn set_enabled(&self, enabled: bool) {
        self.with_state(|st| {
            if enabled {
                if !st.enabled {
                    st.enabled = true;
                    st.set_mode(Mode::Base);
                }
                return;
            }
            self.reset_timers();
            if st.song.take().is_some() {
                st.song_updated();
            }
            st.enabled = false;
            st.set_mode(Mode::Disabled);
        });
    }

    /// Feeds one playback observation. Does nothing while disabled.
    pub async fn on_snapshot(&self, snapshot: Snapshot) {
        let next = self.with_state(|st| self.apply_snapshot(st, snapshot));
        self.follow_up(next).await;
    }

    pub fn skip(&self) -> Result<(), ControllerError> {
        self.with_state(|st| -> Result<(), ControllerError> {
            let song = st.song.as_mut().ok_or(ControllerError::NoActiveSession)?;
            song.mark_skipped();
            info!(generation = song.generation(), "song skipped");
            self.reset_timers();
            st.song_updated();
            st.set_mode(Mode::Skipped);
            Ok(())
        })
    }

    /// Overrides the song's identity and runs enrichment again.
    pub async fn set_user_identity(&self, edits: UserEdits) -> Result<(), ControllerError> {
        let next = self.with_state(|st| -> Result<Next, ControllerError> {
            let song = Self::editable_song(st)?;
            self.shared.storage.save_edits(song, &edits);
            song.user_edits = Some(edits).filter(|e| !e.is_empty());
            Ok(self.restart_enrichment(st))
        })?;
        self.follow_up(next).await;
        Ok(())
    }

    /// Drops user edits and runs enrichment again from the player's fields.
    pub async fn reset_identity(&self) -> Result<(), ControllerError> {
        let next = self.with_state(|st| -> Result<Next, ControllerError> {
            let song = Self::editable_song(st)?;
            self.shared.storage.remove_edits(song);
            song.user_edits = None;
            Ok(self.restart_enrichment(st))
        })?;
        self.follow_up(next).await;
        Ok(())
    }

    pub async fn toggle_like_status(&self, loved: bool) -> Result<Aggregate, ControllerError> {
        let song = self.with_state(|st| -> Result<Song, ControllerError> {
            let song = st.song.as_ref().ok_or(ControllerError::NoActiveSession)?;
            if !song.is_valid() {
                return Err(ControllerError::InvalidSession);
            }
            Ok(song.clone())
        })?;

        let results = self.shared.roster.love(&song, loved).await;
        let outcome = aggregate(&results);
        if outcome != Aggregate::Accepted {
            warn!(loved, results = ?results, "no service accepted love status");
            return Ok(outcome);
        }

        self.with_state(|st| {
            if let Some(current) = st.song_mut(song.generation()) {
                current.metadata.user_loved = Some(loved);
                st.song_updated();
            }
        });
        Ok(outcome)
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        let out = {
            let mut st = lock(&self.shared.state);
            f(&mut st)
        };
        self.flush();
        out
    }

    fn flush(&self) {
        let _order = lock(&self.shared.dispatch);
        let notices = std::mem::take(&mut lock(&self.shared.state).notices);
        let listener = &self.shared.listener;
        for notice in notices {
            match notice {
                Notice::Mode(mode) => listener.on_mode_changed(mode),
                Notice::SongUpdated(song) => listener.on_song_updated(song.as_ref()),
                Notice::NowPlaying(song) => listener.on_now_playing(&song),
            }
        }
    }

    async fn follow_up(&self, mut next: Next) {
        loop {
            next = match next {
                Next::Nothing => return,
                Next::Enrich { generation, pass } => self.enrich(generation, pass).await,
                Next::NowPlaying { generation } => {
                    self.mark_now_playing(generation).await;
                    return;
                }
            };
        }
    }

    fn apply_snapshot(&self, st: &mut State, snapshot: Snapshot) -> Next {
        if !st.enabled {
            return Next::Nothing;
        }

        if snapshot.is_empty() {
            if st.song.is_some() {
                debug!("empty snapshot; ending current song");
                self.end_song(st);
            } else {
                debug!("ignoring empty snapshot");
            }
            return Next::Nothing;
        }

        let same_item = st
            .song
            .as_ref()
            .is_some_and(|song| song.parsed().is_same_item(&snapshot));
        let replay = same_item && self.is_replay(st, &snapshot);

        if same_item && !replay {
            return self.update_song(st, &snapshot);
        }

        if !snapshot.is_playing {
            if st.song.is_some() {
                debug!("different item is not playing; ending current song");
                self.end_song(st);
            }
            return Next::Nothing;
        }

        self.start_song(st, snapshot, replay)
    }

    fn is_replay(&self, st: &State, snapshot: &Snapshot) -> bool {
        let window = st.options.replay_window.as_secs_f64();
        self.shared.replay_timer.is_expired()
            && snapshot.current_time.is_some_and(|t| t <= window)
    }

    fn update_song(&self, st: &mut State, snapshot: &Snapshot) -> Next {
        let options = st.options.clone();
        let Some(song) = st.song.as_mut() else {
            return Next::Nothing;
        };
        if song.flags().is_skipped || song.parsed() == snapshot {
            return Next::Nothing;
        }

        let was_playing = song.parsed().is_playing;
        if song.apply_timing(snapshot) && song.is_valid() {
            debug!(duration = ?song.duration(), "duration changed; retargeting timers");
            self.retarget(&options, song.duration());
        }

        let mut next = Next::Nothing;
        if was_playing != snapshot.is_playing {
            if snapshot.is_playing {
                self.shared.scrobble_timer.resume();
                self.shared.replay_timer.resume();
                if song.is_valid() && !song.flags().is_marked_as_playing {
                    next = Next::NowPlaying {
                        generation: song.generation(),
                    };
                }
            } else {
                self.shared.scrobble_timer.pause();
                self.shared.replay_timer.pause();
            }
        }

        st.song_updated();
        next
    }

    fn start_song(&self, st: &mut State, snapshot: Snapshot, replay: bool) -> Next {
        if st.song.is_some() {
            self.end_song(st);
        }

        st.generation += 1;
        st.enrich_pass += 1;
        let generation = st.generation;
        let mut song = Song::new(snapshot, generation);
        if replay {
            song.mark_replaying();
        }
        info!(generation, replay, key = %song.key(), "new song detected");

        if song.parsed().is_podcast && !st.options.scrobble_podcasts {
            song.mark_skipped();
            st.song = Some(song);
            st.song_updated();
            st.set_mode(Mode::Skipped);
            return Next::Nothing;
        }

        st.song = Some(song);
        st.song_updated();
        st.set_mode(Mode::Loading);
        self.start_timers(generation);

        Next::Enrich {
            generation,
            pass: st.enrich_pass,
        }
    }

    /// Drops the current song, queueing it first if it played long enough.
    fn end_song(&self, st: &mut State) {
        self.apply_partial_credit(st);
        self.reset_timers();
        st.song = None;
        st.song_updated();
        st.set_mode(Mode::Base);
    }

    /// An unidentified song that still played past its threshold is queued
    /// for every service so it can be reported once it has been fixed up.
    fn apply_partial_credit(&self, st: &State) {
        let Some(song) = st.song.as_ref() else {
            return;
        };
        let flags = song.flags();
        if flags.is_valid || flags.is_scrobbled || flags.is_skipped {
            return;
        }
        let Some(threshold) = st.options.threshold(song.duration()) else {
            return;
        };
        let elapsed = self.shared.scrobble_timer.elapsed();
        if elapsed < threshold {
            return;
        }
        info!(
            generation = song.generation(),
            elapsed_secs = elapsed.as_secs_f64(),
            "unidentified song played past threshold; queueing"
        );
        self.shared.storage.enqueue(song.clone(), self.shared.roster.ids());
    }

    fn start_timers(&self, generation: u64) {
        let weak = Arc::downgrade(&self.shared);
        self.shared.scrobble_timer.start(move || {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let controller = Controller { shared };
            tokio::spawn(async move {
                controller.on_scrobble_timer(generation).await;
            });
        });
        self.shared.replay_timer.start(|| {});
    }

    fn retarget(&self, options: &ControllerOptions, duration: Option<f64>) {
        self.shared.scrobble_timer.update(options.threshold(duration));
        self.shared.replay_timer.update(replay_target(duration));
    }

    fn reset_timers(&self) {
        self.shared.scrobble_timer.reset();
        self.shared.replay_timer.reset();
    }

    fn editable_song(st: &mut State) -> Result<&mut Song, ControllerError> {
        let song = st.song.as_mut().ok_or(ControllerError::NoActiveSession)?;
        let flags = song.flags();
        if flags.is_scrobbled {
            return Err(ControllerError::AlreadyScrobbled);
        }
        if flags.is_skipped {
            return Err(ControllerError::SkippedSession);
        }
        Ok(song)
    }

    fn restart_enrichment(&self, st: &mut State) -> Next {
        let Some(song) = st.song.as_mut() else {
            return Next::Nothing;
        };
        song.clear_processed();
        let generation = song.generation();
        self.shared.scrobble_timer.update(None);
        self.shared.replay_timer.update(None);
        st.enrich_pass += 1;
        st.song_updated();
        st.set_mode(Mode::Loading);
        Next::Enrich {
            generation,
            pass: st.enrich_pass,
        }
    }

    async fn enrich(&self, generation: u64, pass: u64) -> Next {
        let Some(mut song) = self.with_state(|st| st.song_mut(generation).cloned()) else {
            return Next::Nothing;
        };

        self.shared.enricher.process(&mut song).await;

        self.with_state(|st| self.commit_enrichment(st, generation, pass, song))
    }

    fn commit_enrichment(&self, st: &mut State, generation: u64, pass: u64, enriched: Song) -> Next {
        if st.enrich_pass != pass {
            debug!(generation, pass, "dropping superseded enrichment");
            return Next::Nothing;
        }
        let options = st.options.clone();
        let Some(song) = st.song_mut(generation) else {
            debug!(generation, "dropping enrichment for a song that is gone");
            return Next::Nothing;
        };
        if song.flags().is_skipped {
            return Next::Nothing;
        }

        let valid = enriched.is_valid();
        song.processed = enriched.processed;
        song.metadata.links = enriched.metadata.links;
        song.set_valid(valid);

        if !song.is_valid() {
            info!(generation, "song could not be identified");
            let song = song.clone();
            st.song_updated();
            st.set_mode(Mode::Unknown);
            st.notices.push(Notice::NowPlaying(song));
            return Next::Nothing;
        }

        self.retarget(&options, song.duration());
        let is_playing = song.parsed().is_playing;
        let scrobbled = song.flags().is_scrobbled;
        let snapshot = song.clone();
        st.song_updated();
        if !scrobbled {
            st.set_mode(Mode::Playing);
        }

        if !is_playing {
            return Next::Nothing;
        }
        if self.shared.scrobble_timer.is_expired() {
            // Threshold passed while enrichment ran; the scrobble is already on its way.
            st.notices.push(Notice::NowPlaying(snapshot));
            return Next::Nothing;
        }
        Next::NowPlaying { generation }
    }

    async fn mark_now_playing(&self, generation: u64) {
        let song = self.with_state(|st| {
            st.song_mut(generation)
                .filter(|s| s.is_valid() && !s.flags().is_skipped)
                .cloned()
        });
        let Some(song) = song else {
            return;
        };

        let results = self.shared.roster.now_playing(&song).await;

        self.with_state(|st| {
            let Some(current) = st.song_mut(generation) else {
                debug!(generation, "dropping now-playing result for a song that is gone");
                return;
            };
            let outcome = aggregate(&results);
            if outcome != Aggregate::Accepted {
                warn!(generation, results = ?results, "now playing was not accepted");
                if current.flags().is_scrobbled {
                    return;
                }
                st.set_mode(if outcome == Aggregate::Ignored {
                    Mode::Ignored
                } else {
                    Mode::Err
                });
                return;
            }
            current.set_marked_as_playing(true);
            let scrobbled = current.flags().is_scrobbled;
            let snapshot = current.clone();
            if !scrobbled {
                st.set_mode(Mode::Playing);
            }
            st.notices.push(Notice::NowPlaying(snapshot));
        });
    }

    async fn on_scrobble_timer(&self, generation: u64) {
        let song = self.with_state(|st| -> Option<Song> {
            if !st.enabled {
                return None;
            }
            let song = st.song_mut(generation)?;
            let flags = song.flags();
            if flags.is_skipped || flags.is_scrobbled {
                return None;
            }
            if !flags.is_valid {
                debug!(generation, "threshold reached before the song was identified");
                return None;
            }
            Some(song.clone())
        });
        let Some(song) = song else {
            return;
        };

        info!(generation, key = %song.key(), "scrobbling");
        let results = self.shared.roster.scrobble(&song).await;

        let failed = failed_services(&results);
        if !failed.is_empty() {
            warn!(generation, services = ?failed, "scrobble failed; queueing for retry");
            self.shared.storage.enqueue(song, failed);
        }

        self.with_state(|st| {
            let Some(current) = st.song_mut(generation) else {
                debug!(generation, "dropping scrobble result for a song that is gone");
                return;
            };
            match aggregate(&results) {
                Aggregate::Accepted => {
                    current.mark_scrobbled();
                    st.song_updated();
                    st.set_mode(Mode::Scrobbled);
                }
                Aggregate::Ignored => st.set_mode(Mode::Ignored),
                Aggregate::Failed => st.set_mode(Mode::Err),
            }
        });
    }
}
