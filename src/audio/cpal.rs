// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
use std::{
    error::Error,
    fmt,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam_channel::Sender;
use parking_lot::Mutex;
use tracing::{debug, error, info, span, Level};

use super::{
    resample::{resample, to_float},
    PcmEvent, PcmStatus, PlaybackTracker,
};
use crate::playsync::CancelHandle;

/// A small wrapper around a cpal::Device.
pub struct Device {
    /// The name of the device.
    name: String,
    /// The host ID of the device.
    host_id: cpal::HostId,
    /// The underlying cpal device.
    device: cpal::Device,
    /// Playback status, fed by the output thread.
    tracker: Arc<PlaybackTracker>,
    /// The current playback, if any.
    playback: Mutex<Option<Playback>>,
}

/// A running output thread. The thread owns the cpal stream for as long as
/// the playback lasts.
struct Playback {
    cancel_handle: CancelHandle,
    thread: thread::JoinHandle<()>,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.host_id.name())
    }
}

/// Writes a mono voice block to every channel of the output buffer, posting
/// a drain notification once the block runs out.
struct VoiceOutput {
    frames: Vec<f32>,
    position: usize,
    channels: usize,
    generation: u64,
    events: Sender<PcmEvent>,
    drained: bool,
    finished: Arc<AtomicBool>,
    cancel_handle: CancelHandle,
}

impl VoiceOutput {
    fn fill<T: cpal::Sample + cpal::FromSample<f32>>(&mut self, data: &mut [T]) {
        for frame in data.chunks_mut(self.channels.max(1)) {
            let value = match self.frames.get(self.position) {
                Some(value) => {
                    self.position += 1;
                    *value
                }
                None => {
                    self.drain();
                    0.0
                }
            };
            for sample in frame.iter_mut() {
                *sample = T::from_sample(value);
            }
        }
    }

    fn drain(&mut self) {
        if self.drained {
            return;
        }
        self.drained = true;
        let _ = self.events.send(PcmEvent::Drained(self.generation));
        self.finished.store(true, Ordering::Relaxed);
        self.cancel_handle.notify();
    }
}

fn build_stream<T>(
    device: &cpal::Device,
    config: &cpal::StreamConfig,
    mut output: VoiceOutput,
) -> Result<cpal::Stream, cpal::BuildStreamError>
where
    T: cpal::SizedSample + cpal::FromSample<f32>,
{
    device.build_output_stream(
        config,
        move |data: &mut [T], _: &cpal::OutputCallbackInfo| output.fill(data),
        |err| error!("CPAL output stream error: {}", err),
        None,
    )
}

/// Opens the device at its default configuration, converts the voice block to
/// the device rate and starts the stream.
fn open_stream(
    device: &cpal::Device,
    samples: &[u8],
    sample_rate: u32,
    mut output: VoiceOutput,
) -> Result<cpal::Stream, Box<dyn Error>> {
    let supported = device.default_output_config()?;
    let config = supported.config();
    output.frames = resample(&to_float(samples), sample_rate, config.sample_rate)?;
    output.channels = usize::from(config.channels);
    debug!(
        sample_rate = config.sample_rate,
        channels = config.channels,
        format = ?supported.sample_format(),
        frames = output.frames.len(),
        "Opening output stream."
    );

    let stream = match supported.sample_format() {
        cpal::SampleFormat::I16 => build_stream::<i16>(device, &config, output)?,
        cpal::SampleFormat::U16 => build_stream::<u16>(device, &config, output)?,
        cpal::SampleFormat::I32 => build_stream::<i32>(device, &config, output)?,
        _ => build_stream::<f32>(device, &config, output)?,
    };
    stream.play()?;
    Ok(stream)
}

impl Device {
    /// Lists cpal devices and produces the Device trait.
    pub fn list() -> Result<Vec<Box<dyn super::Device>>, Box<dyn Error>> {
        Ok(Device::list_cpal_devices()?
            .into_iter()
            .map(|device| {
                let device: Box<dyn super::Device> = Box::new(device);
                device
            })
            .collect())
    }

    /// Lists cpal devices that have at least one output configuration.
    fn list_cpal_devices() -> Result<Vec<Device>, Box<dyn Error>> {
        // Suppress noisy output here.
        let _shh_stdout = shh::stdout()?;
        let _shh_stderr = shh::stderr()?;

        let mut devices: Vec<Device> = Vec::new();
        for host_id in cpal::available_hosts() {
            let host_devices = match cpal::host_from_id(host_id)?.devices() {
                Ok(host_devices) => host_devices,
                Err(e) => {
                    error!(
                        err = e.to_string(),
                        host = host_id.name(),
                        "Unable to list devices for host"
                    );
                    continue;
                }
            };

            for device in host_devices {
                let has_output = match device.supported_output_configs() {
                    Ok(mut configs) => configs.next().is_some(),
                    Err(_) => false,
                };
                if has_output {
                    devices.push(Device::wrap(device.name()?, host_id, device));
                }
            }
        }

        devices.sort_by_key(|device| device.name.to_string());
        Ok(devices)
    }

    fn wrap(name: String, host_id: cpal::HostId, device: cpal::Device) -> Device {
        Device {
            name,
            host_id,
            device,
            tracker: Arc::new(PlaybackTracker::new()),
            playback: Mutex::new(None),
        }
    }

    /// Gets the given cpal device. "default" picks the default output device
    /// of the default host.
    pub fn get(name: &str) -> Result<Device, Box<dyn Error>> {
        if name == "default" {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or("no default output device")?;
            return Ok(Device::wrap(device.name()?, host.id(), device));
        }

        Device::list_cpal_devices()?
            .into_iter()
            .find(|device| device.name.trim().contains(name))
            .ok_or_else(|| format!("no device found with name {}", name).into())
    }
}

impl super::Device for Device {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn play_samples(&self, samples: Vec<u8>, sample_rate: u32) -> Result<(), Box<dyn Error>> {
        let span = span!(Level::INFO, "play samples (cpal)");
        let _enter = span.enter();

        self.stop()?;
        info!(
            device = self.name,
            samples = samples.len(),
            sample_rate,
            "Playing samples."
        );

        let (generation, events) = self.tracker.start();
        let cancel_handle = CancelHandle::new();
        let finished = Arc::new(AtomicBool::new(false));
        let output = VoiceOutput {
            frames: Vec::new(),
            position: 0,
            channels: 1,
            generation,
            events: events.clone(),
            drained: false,
            finished: finished.clone(),
            cancel_handle: cancel_handle.clone(),
        };

        // The stream is created and dropped on this thread since cpal streams
        // can't move between threads on every host.
        let device = self.device.clone();
        let thread = {
            let cancel_handle = cancel_handle.clone();
            thread::spawn(move || {
                let _stream = match open_stream(&device, &samples, sample_rate, output) {
                    Ok(stream) => stream,
                    Err(e) => {
                        error!(err = e.to_string(), "Unable to play samples.");
                        let _ = events.send(PcmEvent::Drained(generation));
                        return;
                    }
                };

                cancel_handle.wait(finished);
            })
        };

        *self.playback.lock() = Some(Playback {
            cancel_handle,
            thread,
        });
        Ok(())
    }

    fn stop(&self) -> Result<(), Box<dyn Error>> {
        let playback = self.playback.lock().take();
        if let Some(playback) = playback {
            playback.cancel_handle.cancel();
            if playback.thread.join().is_err() {
                return Err("Error while joining thread!".into());
            }
            info!(device = self.name, "Stopped samples.");
        }
        self.tracker.stop();
        Ok(())
    }

    fn status(&self) -> PcmStatus {
        self.tracker.status()
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Some(playback) = self.playback.get_mut().take() {
            playback.cancel_handle.cancel();
            let _ = playback.thread.join();
        }
    }
}
