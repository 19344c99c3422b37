//! Engine factory: execution context, audio device and the engine API in one handle.

use std::sync::Arc;

use log::{debug, info};
use webrtc::api::interceptor_registry::register_default_interceptors;
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::{APIBuilder, API};
use webrtc::interceptor::registry::Registry;

use crate::config::{ConnectionConfig, FactoryOptions, NativeConfiguration, SdpSemantics};
use crate::device::AudioDeviceStub;
use crate::error::{Result, RtcError};
use crate::logging;
use crate::media::AudioFrameSource;
use crate::observer::{CallbackBridge, PeerConnectionObserver};
use crate::peer::PeerConnectionHandle;
use crate::runtime::ExecutionContext;

/// Everything a factory owns. Shared by the factory handle and every peer connection.
pub(crate) struct FactoryCore {
    api: Option<Arc<API>>,
    audio_device: Arc<AudioDeviceStub>,
    context: ExecutionContext,
}

impl FactoryCore {
    pub(crate) fn context(&self) -> &ExecutionContext {
        &self.context
    }

    fn api(&self) -> Result<Arc<API>> {
        self.api
            .clone()
            .ok_or_else(|| RtcError::FactoryCreation("engine already released".to_string()))
    }
}

impl Drop for FactoryCore {
    fn drop(&mut self) {
        // the engine references the threads, so it goes first
        drop(self.api.take());
        self.context.stop();
        info!("engine factory released");
    }
}

/// Owning handle to one engine factory. Clones share the same engine.
#[derive(Clone)]
pub struct EngineFactory {
    core: Arc<FactoryCore>,
}

/// Create a factory with default options.
pub fn create_factory() -> Result<EngineFactory> {
    create_factory_with(FactoryOptions::default())
}

/// Create a factory. Either every part is constructed or nothing is left running.
pub fn create_factory_with(options: FactoryOptions) -> Result<EngineFactory> {
    logging::init(options.log_filter.as_deref());

    let context = ExecutionContext::start(&options)?;

    let audio_device = context.worker().invoke(|| {
        let device = AudioDeviceStub::create();
        device.init().map(|()| device)
    })??;

    let api = context.network().invoke(build_engine)??;

    info!(
        "engine factory ready (device on {})",
        audio_device.owner_thread_name()
    );

    Ok(EngineFactory {
        core: Arc::new(FactoryCore {
            api: Some(Arc::new(api)),
            audio_device,
            context,
        }),
    })
}

/// Built-in codecs and the default interceptor chain.
fn build_engine() -> Result<API> {
    let mut media_engine = MediaEngine::default();
    media_engine
        .register_default_codecs()
        .map_err(|e| RtcError::FactoryCreation(format!("failed to register codecs: {}", e)))?;

    let registry = register_default_interceptors(Registry::new(), &mut media_engine).map_err(
        |e| RtcError::FactoryCreation(format!("failed to register interceptors: {}", e)),
    )?;

    Ok(APIBuilder::new()
        .with_media_engine(media_engine)
        .with_interceptor_registry(registry)
        .build())
}

impl EngineFactory {
    /// Create a peer connection that reports to `observer`.
    ///
    /// The observer is owned by the connection from here on. On failure it has already
    /// been dropped. Must not be called from the factory's network thread.
    pub fn create_peer_connection(
        &self,
        config: &ConnectionConfig,
        observer: Box<dyn PeerConnectionObserver>,
    ) -> Result<PeerConnectionHandle> {
        let native = NativeConfiguration::translate(config);
        debug!(
            "creating peer connection: {:?}, {} ice servers",
            native.sdp_semantics,
            native.rtc.ice_servers.len()
        );

        if native.sdp_semantics == SdpSemantics::PlanB {
            return Err(RtcError::ConnectionCreation(
                "plan-b sdp semantics are not supported by the engine".to_string(),
            ));
        }

        let bridge = CallbackBridge::new(observer)?;
        let api = self.core.api()?;
        let rtc = native.rtc.clone();

        let pc = self
            .core
            .context
            .network()
            .block_on(async move { api.new_peer_connection(rtc).await })?
            .map_err(|e| RtcError::ConnectionCreation(e.to_string()))?;

        Ok(PeerConnectionHandle::new(
            Arc::new(pc),
            bridge,
            native,
            Arc::clone(&self.core),
        ))
    }

    /// Create an audio source. Sources are independent of the factory's lifetime.
    pub fn create_audio_track_source(&self) -> AudioFrameSource {
        AudioFrameSource::new()
    }

    pub fn execution_context(&self) -> &ExecutionContext {
        &self.core.context
    }

    pub fn audio_device(&self) -> &Arc<AudioDeviceStub> {
        &self.core.audio_device
    }
}
