//! crates/bookchat_core/src/playback.rs
//!
//! Playback of synthesized speech: one clip at a time, decoded once, paused by
//! tearing down the source and resumed by seeking into the retained buffer.
//!
//! The audio device is abstracted behind [`AudioOutput`]. Sources report their
//! natural end asynchronously through [`Player::on_source_ended`]; a report for a
//! source the player no longer considers active (paused, stopped or replaced) is
//! ignored.

use tracing::{debug, info, warn};

use crate::domain::SynthesizedSpeech;
use crate::speech::{wav_from_speech, SpeechError};

/// Handle for one started playback source.
pub type SourceId = u64;

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("audio output unavailable: {0}")]
    Output(String),
    #[error("failed to decode audio: {0}")]
    Decode(String),
    #[error(transparent)]
    Speech(#[from] SpeechError),
    #[error("clip was superseded before it could play")]
    StaleClip,
}

/// An audio device context: a clock, a suspend switch and one-shot sources.
pub trait AudioOutput {
    /// Decoded samples. Cloning must be cheap; it is reused on every resume.
    type Buffer: Clone;

    /// Context clock, in seconds.
    fn current_time(&self) -> f64;
    fn is_suspended(&self) -> bool;
    fn resume(&mut self) -> Result<(), PlaybackError>;
    fn suspend(&mut self);
    fn decode(&mut self, bytes: &[u8]) -> Result<Self::Buffer, PlaybackError>;
    /// Starts a new source over `buffer`, `offset` seconds in.
    fn start(&mut self, buffer: &Self::Buffer, offset: f64) -> Result<SourceId, PlaybackError>;
    /// Stops a source. Implementations may still report its end afterwards.
    fn stop(&mut self, source: SourceId);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Playing,
    Paused,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackEvent {
    Play,
    Pause,
    Resume,
    Stop,
    SourceEnded,
    Failed,
}

/// The transition table. `None` means the event is ignored in that phase.
pub fn next_phase(phase: Phase, event: PlaybackEvent) -> Option<Phase> {
    use PlaybackEvent::*;
    match (phase, event) {
        (_, Play) => Some(Phase::Playing),
        (Phase::Playing, Pause) => Some(Phase::Paused),
        (Phase::Paused, Resume) => Some(Phase::Playing),
        (Phase::Playing, SourceEnded) => Some(Phase::Idle),
        (_, Stop) | (_, Failed) => Some(Phase::Idle),
        _ => None,
    }
}

enum PlaybackState<B> {
    Idle,
    Playing {
        buffer: B,
        source: SourceId,
        started_at: f64,
    },
    Paused {
        buffer: B,
    },
}

/// Issued when a new clip is requested; only the latest ticket may play.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClipTicket {
    generation: u64,
}

type OutputFactory<O> = Box<dyn FnMut() -> Result<O, PlaybackError>>;

pub struct Player<O: AudioOutput> {
    factory: OutputFactory<O>,
    output: Option<O>,
    state: PlaybackState<O::Buffer>,
    resume_position: f64,
    generation: u64,
}

impl<O: AudioOutput> Player<O> {
    /// The output context is created by `factory` on first use.
    pub fn new(factory: impl FnMut() -> Result<O, PlaybackError> + 'static) -> Self {
        Self {
            factory: Box::new(factory),
            output: None,
            state: PlaybackState::Idle,
            resume_position: 0.0,
            generation: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        match self.state {
            PlaybackState::Idle => Phase::Idle,
            PlaybackState::Playing { .. } => Phase::Playing,
            PlaybackState::Paused { .. } => Phase::Paused,
        }
    }

    pub fn is_playing(&self) -> bool {
        self.phase() == Phase::Playing
    }

    pub fn is_paused(&self) -> bool {
        self.phase() == Phase::Paused
    }

    /// Seconds of the current clip already played before the last pause.
    pub fn resume_position(&self) -> f64 {
        self.resume_position
    }

    /// Whether the play/pause and stop controls should be shown.
    pub fn controls_visible(&self) -> bool {
        self.phase() != Phase::Idle
    }

    /// Starts a new clip request. Whatever was playing or paused is discarded
    /// and any earlier ticket becomes stale.
    pub fn begin_clip(&mut self) -> ClipTicket {
        self.generation = self.generation.wrapping_add(1);
        if self.transition(PlaybackEvent::Stop).is_some() {
            self.enter_idle();
        }
        ClipTicket {
            generation: self.generation,
        }
    }

    /// Decodes `bytes` and plays them from the start, unless a newer clip or a
    /// stop has superseded `ticket`.
    pub fn play_clip(&mut self, ticket: ClipTicket, bytes: &[u8]) -> Result<(), PlaybackError> {
        self.check_ticket(ticket)?;
        let result = match self.output().and_then(|output| output.decode(bytes)) {
            Ok(buffer) => self.play(buffer),
            Err(e) => Err(e),
        };
        if let Err(e) = &result {
            self.fail(e);
        }
        result
    }

    /// Plays a clip as returned by the speech endpoint.
    pub fn play_synthesized(
        &mut self,
        ticket: ClipTicket,
        speech: &SynthesizedSpeech,
    ) -> Result<(), PlaybackError> {
        self.check_ticket(ticket)?;
        let wav = match wav_from_speech(speech) {
            Ok(wav) => wav,
            Err(e) => {
                let e = PlaybackError::from(e);
                self.fail(&e);
                return Err(e);
            }
        };
        self.play_clip(ticket, &wav)
    }

    /// Requests and plays a new clip in one step.
    pub fn speak(&mut self, bytes: &[u8]) -> Result<(), PlaybackError> {
        let ticket = self.begin_clip();
        self.play_clip(ticket, bytes)
    }

    pub fn pause_or_resume(&mut self) -> Result<(), PlaybackError> {
        match self.phase() {
            Phase::Playing => {
                self.pause();
                Ok(())
            }
            Phase::Paused => self.resume(),
            Phase::Idle => Ok(()),
        }
    }

    fn pause(&mut self) {
        let Some(Phase::Paused) = self.transition(PlaybackEvent::Pause) else {
            return;
        };
        let PlaybackState::Playing {
            buffer,
            source,
            started_at,
        } = std::mem::replace(&mut self.state, PlaybackState::Idle)
        else {
            return;
        };
        // Paused before the source stops, so its end report is ignored.
        self.state = PlaybackState::Paused { buffer };
        if let Some(output) = self.output.as_mut() {
            self.resume_position += (output.current_time() - started_at).max(0.0);
            output.stop(source);
        }
        info!(position = self.resume_position, "Playback paused");
    }

    fn resume(&mut self) -> Result<(), PlaybackError> {
        let Some(Phase::Playing) = self.transition(PlaybackEvent::Resume) else {
            return Ok(());
        };
        let PlaybackState::Paused { buffer } = &self.state else {
            return Ok(());
        };
        let buffer = buffer.clone();
        let result = self.play(buffer);
        if let Err(e) = &result {
            self.fail(e);
        }
        result
    }

    /// Stops playback, forgets the clip and suspends the output.
    pub fn stop(&mut self) {
        self.generation = self.generation.wrapping_add(1);
        if self.transition(PlaybackEvent::Stop).is_some() {
            self.enter_idle();
        }
        if let Some(output) = self.output.as_mut() {
            output.suspend();
        }
        debug!("Playback stopped");
    }

    /// Reports that `source` reached its end. Returns `true` only for a genuine
    /// end of the active clip, which resets the player.
    pub fn on_source_ended(&mut self, source: SourceId) -> bool {
        match (&self.state, self.transition(PlaybackEvent::SourceEnded)) {
            (PlaybackState::Playing { source: active, .. }, Some(Phase::Idle)) if *active == source => {
                self.state = PlaybackState::Idle;
                self.resume_position = 0.0;
                info!("Playback finished");
                true
            }
            _ => {
                debug!(source, "Ignoring end of inactive source");
                false
            }
        }
    }

    fn play(&mut self, buffer: O::Buffer) -> Result<(), PlaybackError> {
        let Some(Phase::Playing) = self.transition(PlaybackEvent::Play) else {
            return Ok(());
        };
        self.release_source();
        let offset = self.resume_position;
        let output = self.output()?;
        let source = output.start(&buffer, offset)?;
        let started_at = output.current_time();
        self.state = PlaybackState::Playing {
            buffer,
            source,
            started_at,
        };
        debug!(source, offset, "Playback started");
        Ok(())
    }

    /// Stops the active source, if any, without treating it as an end.
    fn release_source(&mut self) {
        if let PlaybackState::Playing { source, .. } = self.state {
            if let Some(output) = self.output.as_mut() {
                output.stop(source);
            }
            self.state = PlaybackState::Idle;
        }
    }

    fn fail(&mut self, error: &PlaybackError) {
        warn!("Playback failed: {}", error);
        if self.transition(PlaybackEvent::Failed).is_some() {
            self.enter_idle();
        }
    }

    /// Drops the clip entirely: no source, no buffer, position back at zero.
    fn enter_idle(&mut self) {
        self.release_source();
        self.state = PlaybackState::Idle;
        self.resume_position = 0.0;
    }

    /// Looks `event` up in the transition table for the current phase.
    fn transition(&self, event: PlaybackEvent) -> Option<Phase> {
        let next = next_phase(self.phase(), event);
        if next.is_none() {
            debug!(phase = ?self.phase(), ?event, "Ignoring playback event");
        }
        next
    }

    fn check_ticket(&self, ticket: ClipTicket) -> Result<(), PlaybackError> {
        if ticket.generation == self.generation {
            return Ok(());
        }
        debug!(
            ticket = ticket.generation,
            current = self.generation,
            "Dropping superseded clip"
        );
        Err(PlaybackError::StaleClip)
    }

    /// The output context, created on first use and resumed if suspended.
    fn output(&mut self) -> Result<&mut O, PlaybackError> {
        let output = match self.output.take() {
            Some(output) => output,
            None => (self.factory)()?,
        };
        let output = self.output.insert(output);
        if output.is_suspended() {
            output.resume()?;
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Default)]
    struct Device {
        clock: Cell<f64>,
        suspended: Cell<bool>,
        decodes: Cell<usize>,
        created: Cell<usize>,
        starts: RefCell<Vec<(Rc<Vec<u8>>, f64)>>,
        stopped: RefCell<Vec<SourceId>>,
    }

    struct FakeOutput {
        device: Rc<Device>,
        next_source: SourceId,
    }

    impl AudioOutput for FakeOutput {
        type Buffer = Rc<Vec<u8>>;

        fn current_time(&self) -> f64 {
            self.device.clock.get()
        }
        fn is_suspended(&self) -> bool {
            self.device.suspended.get()
        }
        fn resume(&mut self) -> Result<(), PlaybackError> {
            self.device.suspended.set(false);
            Ok(())
        }
        fn suspend(&mut self) {
            self.device.suspended.set(true);
        }
        fn decode(&mut self, bytes: &[u8]) -> Result<Self::Buffer, PlaybackError> {
            if bytes.is_empty() {
                return Err(PlaybackError::Decode("no data".into()));
            }
            self.device.decodes.set(self.device.decodes.get() + 1);
            Ok(Rc::new(bytes.to_vec()))
        }
        fn start(&mut self, buffer: &Self::Buffer, offset: f64) -> Result<SourceId, PlaybackError> {
            self.device.starts.borrow_mut().push((buffer.clone(), offset));
            self.next_source += 1;
            Ok(self.next_source)
        }
        fn stop(&mut self, source: SourceId) {
            self.device.stopped.borrow_mut().push(source);
        }
    }

    fn player() -> (Player<FakeOutput>, Rc<Device>) {
        let device = Rc::new(Device::default());
        let shared = device.clone();
        let player = Player::new(move || {
            shared.created.set(shared.created.get() + 1);
            Ok(FakeOutput {
                device: shared.clone(),
                next_source: 0,
            })
        });
        (player, device)
    }

    fn last_source(device: &Device) -> SourceId {
        device.starts.borrow().len() as SourceId
    }

    #[test]
    fn pause_and_resume_seek_into_the_same_buffer() {
        let (mut player, device) = player();
        player.speak(&[1, 2, 3, 4]).unwrap();
        assert!(player.is_playing());
        assert_eq!(device.created.get(), 1);

        device.clock.set(3.0);
        player.pause_or_resume().unwrap();
        assert!(player.is_paused() && !player.is_playing());
        assert!((player.resume_position() - 3.0).abs() < 1e-9);

        device.clock.set(7.0);
        player.pause_or_resume().unwrap();
        assert!(player.is_playing());
        assert_eq!(device.decodes.get(), 1);

        let starts = device.starts.borrow();
        assert_eq!(starts.len(), 2);
        assert!(Rc::ptr_eq(&starts[0].0, &starts[1].0));
        assert_eq!(starts[0].1, 0.0);
        assert!((starts[1].1 - 3.0).abs() < 1e-9);
    }

    #[test]
    fn position_accumulates_over_several_pauses() {
        let (mut player, device) = player();
        player.speak(&[1, 2]).unwrap();
        device.clock.set(2.0);
        player.pause_or_resume().unwrap();
        device.clock.set(10.0);
        player.pause_or_resume().unwrap();
        device.clock.set(11.5);
        player.pause_or_resume().unwrap();
        assert!((player.resume_position() - 3.5).abs() < 1e-9);
    }

    #[test]
    fn stop_resets_and_next_clip_starts_at_zero() {
        let (mut player, device) = player();
        player.speak(&[1, 2]).unwrap();
        device.clock.set(4.0);
        player.pause_or_resume().unwrap();

        player.stop();
        assert!(!player.is_playing() && !player.is_paused());
        assert_eq!(player.resume_position(), 0.0);
        assert!(!player.controls_visible());
        assert!(device.suspended.get());

        player.speak(&[5, 6]).unwrap();
        assert!(!device.suspended.get());
        assert_eq!(device.starts.borrow().last().map(|s| s.1), Some(0.0));
    }

    #[test]
    fn end_report_after_pause_is_ignored() {
        let (mut player, device) = player();
        player.speak(&[1, 2]).unwrap();
        let source = last_source(&device);
        device.clock.set(3.0);
        player.pause_or_resume().unwrap();

        assert!(!player.on_source_ended(source));
        assert!(player.is_paused());
        assert!((player.resume_position() - 3.0).abs() < 1e-9);

        player.pause_or_resume().unwrap();
        assert_eq!(device.decodes.get(), 1);
    }

    #[test]
    fn natural_end_resets_to_idle() {
        let (mut player, device) = player();
        player.speak(&[1, 2]).unwrap();
        device.clock.set(2.0);
        player.pause_or_resume().unwrap();
        player.pause_or_resume().unwrap();
        let source = last_source(&device);

        assert!(player.on_source_ended(source));
        assert_eq!(player.phase(), Phase::Idle);
        assert_eq!(player.resume_position(), 0.0);
        assert!(!player.controls_visible());
        // Idle ignores further pause requests.
        player.pause_or_resume().unwrap();
        assert_eq!(player.phase(), Phase::Idle);
    }

    #[test]
    fn replacing_a_clip_stops_the_previous_source_without_ending_it() {
        let (mut player, device) = player();
        player.speak(&[1]).unwrap();
        let first = last_source(&device);
        player.speak(&[2]).unwrap();

        assert_eq!(device.stopped.borrow().as_slice(), &[first]);
        assert!(!player.on_source_ended(first));
        assert!(player.is_playing());
    }

    #[test]
    fn stale_clip_is_rejected() {
        let (mut player, device) = player();
        let old = player.begin_clip();
        let new = player.begin_clip();

        assert!(matches!(player.play_clip(old, &[1]), Err(PlaybackError::StaleClip)));
        assert!(device.starts.borrow().is_empty());
        player.play_clip(new, &[1]).unwrap();

        let after_stop = player.begin_clip();
        player.stop();
        assert!(matches!(player.play_clip(after_stop, &[1]), Err(PlaybackError::StaleClip)));
        assert_eq!(player.phase(), Phase::Idle);
    }

    #[test]
    fn broken_payload_for_a_superseded_clip_leaves_playback_alone() {
        let (mut player, device) = player();
        let old = player.begin_clip();
        let new = player.begin_clip();
        player.play_clip(new, &[1]).unwrap();

        let broken = SynthesizedSpeech {
            audio_data: "!!!not base64".to_string(),
            mime_type: "audio/L16;codec=pcm;rate=24000".to_string(),
        };
        assert!(matches!(
            player.play_synthesized(old, &broken),
            Err(PlaybackError::StaleClip)
        ));
        assert!(player.is_playing());
        assert!(device.stopped.borrow().is_empty());
    }

    #[test]
    fn broken_payload_for_the_current_clip_forces_idle() {
        let (mut player, _) = player();
        let ticket = player.begin_clip();
        let broken = SynthesizedSpeech {
            audio_data: "!!!not base64".to_string(),
            mime_type: "audio/L16;codec=pcm;rate=24000".to_string(),
        };
        assert!(matches!(
            player.play_synthesized(ticket, &broken),
            Err(PlaybackError::Speech(_))
        ));
        assert_eq!(player.phase(), Phase::Idle);
    }

    #[test]
    fn events_outside_the_table_change_nothing() {
        let (mut player, device) = player();
        player.speak(&[1, 2]).unwrap();
        device.clock.set(2.0);

        // Resume while playing is not in the table.
        player.resume().unwrap();
        assert_eq!(device.starts.borrow().len(), 1);
        assert!(player.is_playing());
        assert_eq!(player.resume_position(), 0.0);

        player.stop();
        let stops = device.stopped.borrow().len();
        // Pause and resume while idle are ignored too.
        player.pause();
        player.resume().unwrap();
        assert_eq!(player.phase(), Phase::Idle);
        assert_eq!(device.stopped.borrow().len(), stops);
        assert_eq!(device.starts.borrow().len(), 1);
    }

    #[test]
    fn decode_failure_forces_idle() {
        let (mut player, _) = player();
        assert!(matches!(player.speak(&[]), Err(PlaybackError::Decode(_))));
        assert_eq!(player.phase(), Phase::Idle);
        assert!(!player.controls_visible());
    }

    #[test]
    fn synthesized_speech_is_wrapped_before_decoding() {
        let (mut player, device) = player();
        let speech = SynthesizedSpeech {
            audio_data: STANDARD.encode([0u8, 1, 2, 3]),
            mime_type: "audio/L16;codec=pcm;rate=24000".to_string(),
        };
        let ticket = player.begin_clip();
        player.play_synthesized(ticket, &speech).unwrap();

        let starts = device.starts.borrow();
        assert_eq!(&starts[0].0[0..4], b"RIFF");
    }

    #[test]
    fn transition_table_ignores_meaningless_events() {
        assert_eq!(next_phase(Phase::Idle, PlaybackEvent::Pause), None);
        assert_eq!(next_phase(Phase::Paused, PlaybackEvent::SourceEnded), None);
        assert_eq!(next_phase(Phase::Idle, PlaybackEvent::Resume), None);
        assert_eq!(next_phase(Phase::Paused, PlaybackEvent::Stop), Some(Phase::Idle));
        assert_eq!(next_phase(Phase::Playing, PlaybackEvent::Failed), Some(Phase::Idle));
    }
}
