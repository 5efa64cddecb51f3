use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rand::rngs::SmallRng;
use rand::SeedableRng;
use tracing::warn;

use crate::output::{AudioOutput, ScheduledSound};
use crate::state::Store;
use crate::synth;

/// How often the poll loop wakes up.
pub const POLL_INTERVAL: Duration = Duration::from_millis(25);

/// How far ahead of the audio clock steps are queued. Large enough that a
/// late poll doesn't leave a gap, small enough that tempo changes feel
/// immediate.
pub const LOOKAHEAD: f64 = 0.1;

/// Walks the grid ahead of the audio clock and queues every audible hit at
/// its exact start time. All synthesis happens here, ahead of time; nothing
/// is rendered at the moment of sound.
pub struct Scheduler {
    store: Arc<Store>,
    output: Arc<dyn AudioOutput>,
    current_step: usize,
    next_step_time: f64,
    scheduled_through: f64,
    rng: SmallRng,
}

impl Scheduler {
    pub fn new(store: Arc<Store>, output: Arc<dyn AudioOutput>, start_step: usize) -> Self {
        Self::with_rng(store, output, start_step, SmallRng::from_entropy())
    }

    pub fn with_rng(
        store: Arc<Store>,
        output: Arc<dyn AudioOutput>,
        start_step: usize,
        rng: SmallRng,
    ) -> Self {
        let now = output.now();
        Self {
            store,
            output,
            current_step: start_step,
            next_step_time: now,
            scheduled_through: now,
            rng,
        }
    }

    /// The first step that has not been queued yet; where playback resumes.
    pub fn next_step(&self) -> usize {
        self.current_step
    }

    /// One poll iteration: queue every step that falls inside the look-ahead
    /// window. Bounded work, called from the poll thread on a fixed cadence
    /// or from offline drivers with a hand-moved clock.
    pub fn poll(&mut self) {
        let now = self.output.now();
        if self.next_step_time + LOOKAHEAD < now {
            // The loop stalled past the whole window (host hiccup, suspend).
            // Jump the timeline to the present instead of burst-queueing the
            // missed steps as an audible flam.
            warn!(
                behind = now - self.next_step_time,
                "scheduler stalled, fast-forwarding"
            );
            self.next_step_time = now;
        }
        while self.next_step_time < now + LOOKAHEAD {
            self.schedule_step();
        }
    }

    fn schedule_step(&mut self) {
        // One snapshot of grid and mixer per tick; edits that land during
        // this tick are picked up on the next one.
        let pattern = self.store.pattern();
        let mixer = self.store.mixer();
        let transport = self.store.transport();

        let step = self.current_step % pattern.len();
        let at = self.next_step_time.max(self.scheduled_through);
        let master = transport.master_volume() as f32;

        for track in mixer.audible() {
            let (on, velocity) = match pattern.cell(track.voice.id, step) {
                Some(cell) => cell,
                None => continue,
            };
            if !on {
                continue;
            }
            let sound = synth::render_voice(&track.voice, &mut self.rng);
            let gain = velocity * track.voice.volume() * track.volume() * master;
            let result = self.output.submit(ScheduledSound {
                frames: sound.frames,
                start: at,
                gain,
                pan: sound.pan,
                reverb_send: sound.reverb_send,
                delay_send: sound.delay_send,
            });
            // One voice failing to queue must not silence the rest of the
            // tick.
            if let Err(err) = result {
                warn!(voice = %track.voice.id, %err, "dropped trigger");
            }
        }

        self.scheduled_through = at;
        self.store.set_current_step(step);
        self.current_step = (step + 1) % pattern.len();
        self.next_step_time =
            at + transport.step_duration() + transport.swing_offset(self.current_step);
    }
}

/// Owns the poll thread. Stopping is synchronous: the cancel flag is set and
/// the thread joined, so no trigger can be queued once `stop` returns.
pub struct SchedulerHandle {
    cancel: Arc<AtomicBool>,
    thread: thread::JoinHandle<usize>,
}

impl SchedulerHandle {
    pub fn spawn(mut scheduler: Scheduler) -> Self {
        let cancel = Arc::new(AtomicBool::new(false));
        let cancelled = cancel.clone();
        let thread = thread::spawn(move || {
            while !cancelled.load(Ordering::Relaxed) {
                scheduler.poll();
                thread::sleep(POLL_INTERVAL);
            }
            scheduler.next_step()
        });
        Self { cancel, thread }
    }

    /// Cancels the poll loop and waits for it. Returns the step playback
    /// would resume from.
    pub fn stop(self) -> usize {
        self.cancel.store(true, Ordering::Relaxed);
        self.thread.join().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kit::{default_kit, VoiceId};
    use crate::output::OfflineOutput;
    use crate::state::Store;
    use basedrop::Collector;

    struct Fixture {
        store: Arc<Store>,
        output: Arc<OfflineOutput>,
        ids: Vec<VoiceId>,
        // Dropped last so shared snapshots are reclaimed first.
        _collector: Collector,
    }

    fn fixture() -> Fixture {
        let collector = Collector::new();
        let kit = default_kit();
        let ids = kit.iter().map(|v| v.id).collect();
        let store = Arc::new(Store::new(kit, &collector.handle()));
        Fixture {
            store,
            output: Arc::new(OfflineOutput::new()),
            ids,
            _collector: collector,
        }
    }

    fn scheduler(f: &Fixture) -> Scheduler {
        Scheduler::with_rng(
            f.store.clone(),
            f.output.clone(),
            0,
            SmallRng::seed_from_u64(99),
        )
    }

    fn drive(f: &Fixture, sched: &mut Scheduler, until: f64) {
        let mut t = 0.0;
        while t < until {
            f.output.set_now(t);
            sched.poll();
            t += POLL_INTERVAL.as_secs_f64();
        }
    }

    fn fill_lane(f: &Fixture, voice: usize) {
        let collector = &f._collector;
        let id = f.ids[voice];
        f.store.update_pattern(&collector.handle(), |p| {
            for step in 0..p.len() {
                p.set_step(id, step, true);
            }
        });
    }

    #[test]
    fn cursor_wraps_in_order() {
        let f = fixture();
        f.store.transport().set_tempo(120.0);
        fill_lane(&f, 0);
        let mut sched = scheduler(&f);
        drive(&f, &mut sched, 2.0);

        let triggers = f.output.triggers();
        assert!(triggers.len() >= 16);
        for (i, pair) in triggers.windows(2).enumerate() {
            assert!(
                pair[1].start >= pair[0].start,
                "emission went backwards at {}",
                i
            );
            assert!((pair[1].start - pair[0].start - 0.125).abs() < 1e-9);
        }
    }

    #[test]
    fn emission_is_monotonic_with_swing() {
        let f = fixture();
        f.store.transport().set_tempo(150.0);
        f.store.transport().set_swing(30.0);
        fill_lane(&f, 0);
        let mut sched = scheduler(&f);
        drive(&f, &mut sched, 3.0);

        let triggers = f.output.triggers();
        assert!(triggers
            .windows(2)
            .all(|pair| pair[1].start >= pair[0].start));
    }

    #[test]
    fn fast_forward_after_stall() {
        let f = fixture();
        fill_lane(&f, 0);
        let mut sched = scheduler(&f);

        f.output.set_now(0.0);
        sched.poll();
        let queued_before = f.output.triggers().len();

        // Simulate a long host stall, far past the look-ahead window.
        f.output.set_now(5.0);
        sched.poll();

        let triggers = f.output.triggers();
        assert!(triggers.len() > queued_before);
        // Nothing lands in the skipped span and nothing runs backwards.
        for trigger in &triggers[queued_before..] {
            assert!(trigger.start >= 5.0);
        }
    }

    #[test]
    fn length_change_mid_cycle_keeps_reads_consistent() {
        let f = fixture();
        f.store.transport().set_tempo(200.0);
        fill_lane(&f, 0);
        let mut sched = scheduler(&f);

        let mut t = 0.0;
        while t < 4.0 {
            f.output.set_now(t);
            sched.poll();
            if (t - 1.0).abs() < 1e-9 {
                f.store
                    .update_pattern(&f._collector.handle(), |p| p.set_len(8));
            }
            t += POLL_INTERVAL.as_secs_f64();
        }
        // No panic and still emitting after the shrink.
        let triggers = f.output.triggers();
        assert!(triggers.last().unwrap().start > 3.0);
    }

    #[test]
    fn muted_tracks_do_not_trigger() {
        let f = fixture();
        fill_lane(&f, 0);
        fill_lane(&f, 1);
        f.store.update_mixer(&f._collector.handle(), |m| {
            let id = f.ids[0];
            m.track_mut(id).unwrap().set_muted(true);
        });
        // Tell the two lanes apart by pan.
        f.store.update_mixer(&f._collector.handle(), |m| {
            m.track_mut(f.ids[1]).unwrap().voice.set_pan(0.5);
        });

        let mut sched = scheduler(&f);
        drive(&f, &mut sched, 1.0);

        let triggers = f.output.triggers();
        assert!(!triggers.is_empty());
        assert!(triggers.iter().all(|t| t.pan == 0.5));
    }

    #[test]
    fn velocity_scales_gain() {
        let f = fixture();
        let id = f.ids[0];
        f.store.update_pattern(&f._collector.handle(), |p| {
            p.set_step(id, 0, true);
            p.set_velocity(id, 0, 0.5);
        });
        let mut sched = scheduler(&f);
        f.output.set_now(0.0);
        sched.poll();

        let triggers = f.output.triggers();
        assert_eq!(triggers.len(), 1);
        let track_volume = 1.0;
        let voice_volume = 0.8;
        let master = 0.8;
        let expected = 0.5 * voice_volume * track_volume * master;
        assert!((triggers[0].gain - expected).abs() < 1e-6);
    }
}
