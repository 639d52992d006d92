/// Audio output through rodio
///
/// One `Sink` per channel on a shared output stream.

use std::collections::HashMap;
use std::io::Cursor;

use rodio::{Decoder, OutputStream, OutputStreamHandle, Sink, Source};

use crate::error::BackendError;

use super::backend::{AudioBackend, PlayParams};
use super::library::Clip;
use super::source::ChannelId;

struct Voice {
    sink: Sink,
    /// Pre-mix gain before the master stage
    volume: f32,
}

/// Backend playing on the default system output device
pub struct RodioBackend {
    _stream: OutputStream,
    stream_handle: OutputStreamHandle,
    voices: HashMap<ChannelId, Voice>,
    master_gain: f32,
}

impl RodioBackend {
    /// Open the default output device
    pub fn new() -> Result<Self, BackendError> {
        let (stream, stream_handle) =
            OutputStream::try_default().map_err(|e| BackendError::StreamInitFailed(Box::new(e)))?;
        tracing::info!("Opened default audio output");

        Ok(Self {
            _stream: stream,
            stream_handle,
            voices: HashMap::new(),
            master_gain: 1.0,
        })
    }

    fn decode(
        clip: &Clip,
        params: PlayParams,
    ) -> Result<Box<dyn Source<Item = i16> + Send>, BackendError> {
        // Create decoder from preloaded data
        let cursor = Cursor::new(clip.handle().bytes().to_vec());
        let decoder = Decoder::new(cursor).map_err(|e| BackendError::DecodeFailed(Box::new(e)))?;

        // Each adapter returns a different type, so we use dynamic dispatch
        let mut source: Box<dyn Source<Item = i16> + Send> = if params.looping {
            Box::new(decoder.buffered().repeat_infinite())
        } else {
            Box::new(decoder)
        };
        if (params.pitch - 1.0).abs() > f32::EPSILON {
            source = Box::new(source.speed(params.pitch));
        }
        Ok(source)
    }
}

impl AudioBackend for RodioBackend {
    fn play(
        &mut self,
        channel: ChannelId,
        clip: &Clip,
        params: PlayParams,
    ) -> Result<(), BackendError> {
        let source = Self::decode(clip, params)?;

        // A stopped sink does not restart; every play gets a fresh one
        let sink = Sink::try_new(&self.stream_handle)
            .map_err(|e| BackendError::PlaybackFailed(Box::new(e)))?;
        sink.set_volume(params.volume * self.master_gain);
        sink.append(source);
        sink.play();

        tracing::debug!("{}: sink playing '{}'", channel, clip.name());
        if let Some(old) = self.voices.insert(
            channel,
            Voice {
                sink,
                volume: params.volume,
            },
        ) {
            old.sink.stop();
        }
        Ok(())
    }

    fn stop(&mut self, channel: ChannelId) {
        if let Some(voice) = self.voices.remove(&channel) {
            voice.sink.stop();
        }
    }

    fn pause(&mut self, channel: ChannelId) {
        if let Some(voice) = self.voices.get(&channel) {
            voice.sink.pause();
        }
    }

    fn resume(&mut self, channel: ChannelId) {
        if let Some(voice) = self.voices.get(&channel) {
            voice.sink.play();
        }
    }

    fn is_playing(&self, channel: ChannelId) -> bool {
        self.voices
            .get(&channel)
            .map_or(false, |v| !v.sink.empty() && !v.sink.is_paused())
    }

    fn set_volume(&mut self, channel: ChannelId, volume: f32) {
        if let Some(voice) = self.voices.get_mut(&channel) {
            voice.volume = volume.clamp(0.0, 1.0);
            voice.sink.set_volume(voice.volume * self.master_gain);
        }
    }

    fn set_master_gain(&mut self, gain: f32) {
        self.master_gain = gain.clamp(0.0, 1.0);
        for voice in self.voices.values() {
            voice.sink.set_volume(voice.volume * self.master_gain);
        }
    }

    fn update(&mut self, _dt: f32) {
        // Drop sinks whose one-shot ran out
        self.voices.retain(|_, v| !v.sink.empty());
    }
}
