/*
[INPUT]:  Access token and endpoint options (or a DexConfig)
[OUTPUT]: Ready-to-use HTTP client and connected real-time stream
[POS]:    SDK entry point - wires config, auth, HTTP and stream layers
[UPDATE]: When adding top-level services
*/

use std::sync::Arc;

use tokio::sync::watch;
use tracing::info;

use crate::auth::AccessTokenStore;
use crate::config::{DexAggregatorOptions, DexConfig};
use crate::http::{DexHttpClient, Result};
use crate::stream::StreamApi;
use crate::ws::{CentrifugeTransport, ConnectionState, LoggingConnectionEvents};

/// Endpoints and credentials shared by the HTTP and stream layers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DexRequestContext {
    pub base_url: String,
    pub stream_url: String,
    pub access_token: String,
}

/// Top-level SDK handle
#[derive(Debug)]
pub struct DexAggregator {
    request_ctx: DexRequestContext,
    token_store: AccessTokenStore,
    http: DexHttpClient,
    transport: Arc<CentrifugeTransport>,
    stream: StreamApi,
}

impl DexAggregator {
    /// Build the SDK and start connecting the stream.
    ///
    /// Must be called inside a Tokio runtime for the stream to connect.
    pub fn new(access_token: &str, options: DexAggregatorOptions) -> Result<Self> {
        Self::from_config(DexConfig::new(access_token).with_options(options))
    }

    pub fn from_config(config: DexConfig) -> Result<Self> {
        config.validate()?;

        let request_ctx = DexRequestContext {
            base_url: config.resolved_server_url(),
            stream_url: config.resolved_stream_url(),
            access_token: config.access_token.clone(),
        };

        let token_store = AccessTokenStore::with_token(config.access_token.clone());
        let http = DexHttpClient::with_token_store(
            config.client_config(),
            &request_ctx.base_url,
            token_store.clone(),
        )?;

        let transport = Arc::new(CentrifugeTransport::new(
            config.transport_config(),
            Arc::new(token_store.clone()),
            Arc::new(LoggingConnectionEvents),
        ));
        let stream = StreamApi::new(transport.clone());

        info!(
            base_url = %request_ctx.base_url,
            stream_url = %request_ctx.stream_url,
            "dex aggregator initialized"
        );
        stream.connect();

        Ok(Self {
            request_ctx,
            token_store,
            http,
            transport,
            stream,
        })
    }

    pub fn request_context(&self) -> &DexRequestContext {
        &self.request_ctx
    }

    pub fn http(&self) -> &DexHttpClient {
        &self.http
    }

    pub fn stream(&self) -> &StreamApi {
        &self.stream
    }

    /// Token shared by HTTP requests and stream (re)connects; replace it here to refresh both.
    pub fn token_store(&self) -> &AccessTokenStore {
        &self.token_store
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.transport.subscribe_connection_state()
    }

    /// Close the stream connection.
    pub fn shutdown(&self) {
        self.transport.disconnect();
    }
}
