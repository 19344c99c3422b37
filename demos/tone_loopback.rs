//! Two in-process peer connections sending a 440 Hz tone from one to the other.
//!
//! Usage: cargo run --example tone_loopback
//!
//! Candidates are exchanged inside the full local descriptions once gathering
//! finishes. Press Ctrl+C to stop.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::info;
use rtc_binding::{
    create_factory_with, ConnectionConfig, FactoryOptions, IceCandidate, PeerConnectionHandle,
    PeerConnectionObserver, PeerConnectionState, RemoteTrackInfo, Result, RtcError,
    SignalingState,
};

struct LoggingObserver {
    name: &'static str,
    gathered: mpsc::Sender<()>,
}

impl PeerConnectionObserver for LoggingObserver {
    fn on_signaling_change(&mut self, state: SignalingState) {
        info!("[{}] signaling: {:?}", self.name, state);
    }

    fn on_connection_change(&mut self, state: PeerConnectionState) {
        info!("[{}] connection: {:?}", self.name, state);
    }

    fn on_ice_candidate(&mut self, candidate: IceCandidate) {
        info!("[{}] candidate: {}", self.name, candidate.candidate);
    }

    fn on_ice_gathering_complete(&mut self) {
        info!("[{}] gathering complete", self.name);
        let _ = self.gathered.send(());
    }

    fn on_track(&mut self, track: RemoteTrackInfo) {
        info!("[{}] remote {} track {}", self.name, track.kind, track.track_id);
    }
}

fn wait_gathered(rx: &mpsc::Receiver<()>, name: &str) -> Result<()> {
    rx.recv_timeout(Duration::from_secs(10))
        .map_err(|_| RtcError::InvalidArgument(format!("{}: ice gathering timed out", name)))
}

fn full_description(
    pc: &PeerConnectionHandle,
    name: &str,
) -> Result<rtc_binding::SessionDescription> {
    pc.local_description()?
        .ok_or_else(|| RtcError::InvalidArgument(format!("{}: no local description", name)))
}

fn main() -> Result<()> {
    let factory = create_factory_with(FactoryOptions::default())?;
    let config = ConnectionConfig::default();

    let (caller_tx, caller_gathered) = mpsc::channel();
    let caller = factory.create_peer_connection(
        &config,
        Box::new(LoggingObserver {
            name: "caller",
            gathered: caller_tx,
        }),
    )?;

    let (callee_tx, callee_gathered) = mpsc::channel();
    let callee = factory.create_peer_connection(
        &config,
        Box::new(LoggingObserver {
            name: "callee",
            gathered: callee_tx,
        }),
    )?;

    let source = factory.create_audio_track_source();
    let sender = caller.add_audio_track(&source, "tone", "loopback")?;

    let offer = caller.create_offer()?;
    caller.set_local_description(&offer)?;
    wait_gathered(&caller_gathered, "caller")?;
    callee.set_remote_description(&full_description(&caller, "caller")?)?;

    let answer = callee.create_answer()?;
    callee.set_local_description(&answer)?;
    wait_gathered(&callee_gathered, "callee")?;
    caller.set_remote_description(&full_description(&callee, "callee")?)?;

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .map_err(|e| RtcError::InvalidArgument(format!("ctrl-c handler: {}", e)))?;

    info!("sending tone, press Ctrl+C to stop");
    let frame = Duration::from_millis(10);
    let mut next = Instant::now();
    let mut last_report = Instant::now();

    while running.load(Ordering::SeqCst) {
        source.push_zeroed_data(48000, 2);

        next += frame;
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        }

        if last_report.elapsed() >= Duration::from_secs(1) {
            last_report = Instant::now();
            let stats = sender.stats();
            info!(
                "caller {:?} / callee {:?}: {} frames, {} bytes, {} malformed, {} write errors",
                caller.connection_state(),
                callee.connection_state(),
                stats.frames_sent,
                stats.bytes_sent,
                stats.malformed_frames,
                stats.write_errors
            );
        }
    }

    info!("stopping");
    drop(sender);
    drop(callee);
    drop(caller);
    Ok(())
}
