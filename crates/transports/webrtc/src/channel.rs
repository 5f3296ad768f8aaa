//! Data channel wrapper
//!
//! Bridges the callbacks of an `RTCDataChannel` onto a buffered
//! [`EventRegistry`], so an open or message that fires before anyone
//! subscribed is replayed to the first subscriber.

use crate::error::Error;
use async_trait::async_trait;
use bytes::Bytes;
use rtcscan_core::peer::{ChannelEvent, ChannelMessage, DataChannel};
use rtcscan_core::{EventRegistry, Result};
use std::sync::Arc;
use tracing::{debug, warn};
use webrtc::data_channel::data_channel_state::RTCDataChannelState;
use webrtc::data_channel::RTCDataChannel;

/// [`DataChannel`] backed by webrtc-rs
pub struct WebRtcDataChannel {
    label: String,
    rtc_channel: Arc<RTCDataChannel>,
    events: Arc<EventRegistry<ChannelEvent>>,
}

impl WebRtcDataChannel {
    /// Wrap a channel created locally or announced by the remote side.
    ///
    /// Handlers are installed immediately. webrtc-rs fires `on_open` right
    /// away when the channel is already open.
    pub fn wrap(rtc_channel: Arc<RTCDataChannel>) -> Arc<Self> {
        let label = rtc_channel.label().to_string();
        let events = Arc::new(EventRegistry::buffered());

        let open_events = Arc::clone(&events);
        let open_label = label.clone();
        rtc_channel.on_open(Box::new(move || {
            debug!("Data channel '{}' opened", open_label);
            open_events.emit(ChannelEvent::Open);
            Box::pin(async {})
        }));

        let message_events = Arc::clone(&events);
        rtc_channel.on_message(Box::new(move |msg| {
            let message = if msg.is_string {
                ChannelMessage::Text(String::from_utf8_lossy(&msg.data).into_owned())
            } else {
                ChannelMessage::Binary(msg.data)
            };
            message_events.emit(ChannelEvent::Message(message));
            Box::pin(async {})
        }));

        let close_events = Arc::clone(&events);
        let close_label = label.clone();
        rtc_channel.on_close(Box::new(move || {
            debug!("Data channel '{}' closed", close_label);
            close_events.emit(ChannelEvent::Close);
            Box::pin(async {})
        }));

        let error_label = label.clone();
        rtc_channel.on_error(Box::new(move |err| {
            warn!("Data channel '{}' error: {}", error_label, err);
            Box::pin(async {})
        }));

        Arc::new(Self {
            label,
            rtc_channel,
            events,
        })
    }

    /// The underlying webrtc-rs channel
    pub fn rtc_channel(&self) -> &Arc<RTCDataChannel> {
        &self.rtc_channel
    }
}

#[async_trait]
impl DataChannel for WebRtcDataChannel {
    fn label(&self) -> String {
        self.label.clone()
    }

    fn is_open(&self) -> bool {
        self.rtc_channel.ready_state() == RTCDataChannelState::Open
    }

    async fn send_text(&self, text: &str) -> Result<()> {
        self.rtc_channel
            .send_text(text.to_string())
            .await
            .map_err(Error::from)?;
        Ok(())
    }

    async fn send(&self, data: Bytes) -> Result<()> {
        self.rtc_channel.send(&data).await.map_err(Error::from)?;
        Ok(())
    }

    async fn buffered_amount(&self) -> usize {
        self.rtc_channel.buffered_amount().await
    }

    fn events(&self) -> &EventRegistry<ChannelEvent> {
        &self.events
    }

    async fn close(&self) -> Result<()> {
        if self.rtc_channel.ready_state() == RTCDataChannelState::Closed {
            return Ok(());
        }
        self.rtc_channel.close().await.map_err(Error::from)?;
        Ok(())
    }
}
