//! `ChannelController` (§4.5, C9): derives `subscriberCount` from
//! `spec.formations` and keeps `phase` in sync with it, while leaving a
//! `Paused` Channel alone until an operator resumes it.

use std::sync::Arc;

use kais_core::{ChannelPhase, Result};

use crate::kube::KubeClient;

const MIN_SUBSCRIBERS: usize = 2;

pub struct ChannelController {
    kube: Arc<dyn KubeClient>,
}

impl ChannelController {
    pub fn new(kube: Arc<dyn KubeClient>) -> Self {
        Self { kube }
    }

    /// Observe → compute desired state → diff → patch for one `Channel`
    /// (§4.5). A `Paused` Channel is left untouched: pausing is an explicit
    /// operator action this controller must not silently undo.
    pub async fn reconcile(&self, namespace: &str, name: &str) -> Result<()> {
        let Some(mut channel) = self.kube.channels().get(namespace, name).await? else {
            return Ok(());
        };

        if channel.status.phase == ChannelPhase::Paused {
            return Ok(());
        }

        let subscriber_count = channel.spec.formations.len() as u32;
        channel.status.subscriber_count = subscriber_count;
        channel.status.phase =
            if (subscriber_count as usize) < MIN_SUBSCRIBERS { ChannelPhase::Error } else { ChannelPhase::Active };

        self.kube.channels().put(channel).await
    }
}
