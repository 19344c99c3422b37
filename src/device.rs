//! Software-only audio device.
//!
//! The engine never touches real audio hardware: host code feeds audio through
//! [`AudioFrameSource`](crate::AudioFrameSource). The stub still follows the device
//! threading contract: it is constructed on the worker thread and every state change
//! must happen on that thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, ThreadId};

use log::debug;

use crate::error::{Result, RtcError};

pub struct AudioDeviceStub {
    owner: ThreadId,
    owner_name: String,
    initialized: AtomicBool,
    playing: AtomicBool,
    recording: AtomicBool,
}

impl AudioDeviceStub {
    /// Construct the device on the calling thread, which becomes its owner.
    pub fn create() -> Arc<Self> {
        let current = thread::current();
        let owner_name = current.name().unwrap_or("<unnamed>").to_string();
        debug!("audio device stub created on {}", owner_name);
        Arc::new(Self {
            owner: current.id(),
            owner_name,
            initialized: AtomicBool::new(false),
            playing: AtomicBool::new(false),
            recording: AtomicBool::new(false),
        })
    }

    /// Whether the calling thread owns this device.
    pub fn is_owner_thread(&self) -> bool {
        thread::current().id() == self.owner
    }

    pub fn owner_thread_name(&self) -> &str {
        &self.owner_name
    }

    fn check_thread(&self, op: &str) -> Result<()> {
        if self.is_owner_thread() {
            Ok(())
        } else {
            Err(RtcError::InvalidArgument(format!(
                "audio device {} must run on {}",
                op, self.owner_name
            )))
        }
    }

    fn check_initialized(&self, op: &str) -> Result<()> {
        if self.initialized() {
            Ok(())
        } else {
            Err(RtcError::InvalidArgument(format!(
                "audio device {} before init",
                op
            )))
        }
    }

    pub fn init(&self) -> Result<()> {
        self.check_thread("init")?;
        self.initialized.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn start_playout(&self) -> Result<()> {
        self.check_thread("start_playout")?;
        self.check_initialized("start_playout")?;
        self.playing.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn stop_playout(&self) -> Result<()> {
        self.check_thread("stop_playout")?;
        self.playing.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn start_recording(&self) -> Result<()> {
        self.check_thread("start_recording")?;
        self.check_initialized("start_recording")?;
        self.recording.store(true, Ordering::SeqCst);
        Ok(())
    }

    pub fn stop_recording(&self) -> Result<()> {
        self.check_thread("stop_recording")?;
        self.recording.store(false, Ordering::SeqCst);
        Ok(())
    }

    pub fn initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn playing(&self) -> bool {
        self.playing.load(Ordering::SeqCst)
    }

    pub fn recording(&self) -> bool {
        self.recording.load(Ordering::SeqCst)
    }
}
