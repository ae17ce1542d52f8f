//! Transport boundary: how telemetry batches reach a session.
//!
//! The domain core only sees the [`Transport`]/[`TelemetryStream`] traits
//! and the crate's own batch shapes. [`GrpcTransport`] is the production
//! implementation speaking the OpenConfig telemetry gRPC service; tests
//! substitute scripted mocks.

use std::future::Future;
use std::time::Duration;

use anyhow::Context;
use tonic::transport::{Channel, Endpoint};

use crate::config::{PathConfig, TargetConfig};
use crate::proto;
use crate::proto::open_config_telemetry_client::OpenConfigTelemetryClient;
use crate::telemetry::{Batch, KeyValue, TelemetryValue};

/// Established subscription delivering decoded batches.
pub trait TelemetryStream {
    /// Receive the next batch; `Ok(None)` means the peer closed the stream.
    fn next_batch(&mut self) -> impl Future<Output = anyhow::Result<Option<Batch>>> + Send;
}

/// Factory for subscriptions against one device.
pub trait Transport {
    type Stream: TelemetryStream + Send;

    /// Establish a subscription for the given sensor paths. Each call dials
    /// fresh; the session drives retry and backoff.
    fn subscribe(
        &mut self,
        paths: &[PathConfig],
    ) -> impl Future<Output = anyhow::Result<Self::Stream>> + Send;
}

/// gRPC transport for the OpenConfig telemetry service.
pub struct GrpcTransport {
    address: String,
    keepalive: Duration,
    timeout: Duration,
}

impl GrpcTransport {
    pub fn new(target: &TargetConfig) -> Self {
        Self {
            address: format!("{}:{}", target.hostname, target.port),
            keepalive: Duration::from_secs(target.keepalive_secs),
            timeout: Duration::from_secs(target.timeout_secs),
        }
    }

    async fn connect(&self) -> anyhow::Result<Channel> {
        let endpoint = Endpoint::from_shared(format!("http://{}", self.address))
            .with_context(|| format!("invalid endpoint address {}", self.address))?
            .http2_keep_alive_interval(self.keepalive)
            .keep_alive_timeout(self.timeout)
            .keep_alive_while_idle(true);

        let channel = endpoint
            .connect()
            .await
            .with_context(|| format!("failed to dial {}", self.address))?;
        Ok(channel)
    }
}

impl Transport for GrpcTransport {
    type Stream = GrpcStream;

    async fn subscribe(&mut self, paths: &[PathConfig]) -> anyhow::Result<GrpcStream> {
        let channel = self.connect().await?;
        let mut client = OpenConfigTelemetryClient::new(channel);

        let request = build_subscription_request(paths);
        let response = client
            .telemetry_subscribe(tonic::Request::new(request))
            .await
            .context("TelemetrySubscribe failed")?;

        Ok(GrpcStream {
            inner: response.into_inner(),
        })
    }
}

/// Server-side stream of telemetry batches.
pub struct GrpcStream {
    inner: tonic::Streaming<proto::OpenConfigData>,
}

impl TelemetryStream for GrpcStream {
    async fn next_batch(&mut self) -> anyhow::Result<Option<Batch>> {
        let message = self.inner.message().await?;
        Ok(message.map(decode_data))
    }
}

/// Build the subscription request, forwarding each path's knobs verbatim.
fn build_subscription_request(paths: &[PathConfig]) -> proto::SubscriptionRequest {
    proto::SubscriptionRequest {
        path_list: paths
            .iter()
            .map(|p| proto::Path {
                path: p.path.clone(),
                filter: String::new(),
                suppress_unchanged: p.suppress_unchanged,
                max_silent_interval: p.max_silent_interval_ms,
                sample_frequency: p.sample_frequency_ms,
                need_eos: false,
            })
            .collect(),
        additional_config: Some(proto::SubscriptionAdditionalConfig {
            limit_records: -1,
            limit_time_seconds: -1,
            need_eos: false,
        }),
    }
}

fn decode_data(data: proto::OpenConfigData) -> Batch {
    let entries = data
        .kv
        .into_iter()
        .map(|kv| KeyValue {
            key: kv.key,
            value: kv.value.map(decode_value),
        })
        .collect();

    Batch { entries }
}

fn decode_value(value: proto::key_value::Value) -> TelemetryValue {
    use proto::key_value::Value;

    match value {
        Value::DoubleValue(v) => TelemetryValue::Double(v),
        Value::IntValue(v) => TelemetryValue::Int64(v),
        Value::UintValue(v) => TelemetryValue::Uint64(v),
        Value::SintValue(v) => TelemetryValue::Sint64(v),
        Value::BoolValue(v) => TelemetryValue::Bool(v),
        Value::StrValue(v) => TelemetryValue::String(v),
    }
}
