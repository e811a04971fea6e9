/*
[INPUT]:  Chain/token/wallet parameters and typed callbacks
[OUTPUT]: Subscription handles; callbacks receive reshaped payloads
[POS]:    Stream layer - domain adapters over the channel multiplexer
[UPDATE]: When adding channel families or changing payload mappings
*/

use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;

use crate::http::Result;
use crate::types::wire::{BalanceWire, CandleWire, TokenActivityWire, reshape, reshape_list};
use crate::types::{Balance, Candle, Resolution, TokenActivity, TokenStat};
use crate::ws::Transport;

use super::channel;
use super::multiplexer::{ChannelMultiplexer, Listener, SubscriptionHandle};

/// Real-time API: raw channel subscriptions plus typed helpers
#[derive(Clone)]
pub struct StreamApi {
    transport: Arc<dyn Transport>,
    multiplexer: ChannelMultiplexer,
}

impl std::fmt::Debug for StreamApi {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamApi")
            .field("multiplexer", &self.multiplexer)
            .finish()
    }
}

impl StreamApi {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            multiplexer: ChannelMultiplexer::new(transport.clone()),
            transport,
        }
    }

    /// Start the shared connection; subscriptions may be made before or after.
    pub fn connect(&self) {
        self.transport.connect();
    }

    pub fn multiplexer(&self) -> &ChannelMultiplexer {
        &self.multiplexer
    }

    pub fn subscribe(&self, channel: &str, listener: Listener) -> Result<SubscriptionHandle> {
        self.multiplexer.subscribe(channel, listener)
    }

    pub fn unsubscribe(&self, channel: &str, listener: &Listener) {
        self.multiplexer.unsubscribe(channel, listener);
    }

    /// Candle updates for one token at one resolution
    ///
    /// Channel: `dex-candle:<chain>_<token>_<resolution>`
    pub fn subscribe_candles<F>(
        &self,
        chain: &str,
        token_address: &str,
        resolution: Resolution,
        callback: F,
    ) -> Result<SubscriptionHandle>
    where
        F: Fn(Candle) + Send + Sync + 'static,
    {
        let name = channel::candle_channel(chain, token_address, resolution.as_str());
        self.subscribe(
            &name,
            Arc::new(move |payload: &Value| callback(reshape::<CandleWire, Candle>(payload))),
        )
    }

    /// Rolling statistics for one token
    ///
    /// Channel: `dex-token-stats:<chain>_<token>`
    pub fn subscribe_token_stats<F>(
        &self,
        chain: &str,
        token_address: &str,
        callback: F,
    ) -> Result<SubscriptionHandle>
    where
        F: Fn(TokenStat) + Send + Sync + 'static,
    {
        let name = channel::token_stats_channel(chain, token_address);
        self.subscribe(
            &name,
            Arc::new(move |payload: &Value| {
                callback(TokenStat::deserialize(payload).unwrap_or_default())
            }),
        )
    }

    /// Swaps and liquidity events for one token
    ///
    /// Channel: `dex-token-activities:<chain>_<token>`
    pub fn subscribe_token_activities<F>(
        &self,
        chain: &str,
        token_address: &str,
        callback: F,
    ) -> Result<SubscriptionHandle>
    where
        F: Fn(Vec<TokenActivity>) + Send + Sync + 'static,
    {
        let name = channel::token_activities_channel(chain, token_address);
        self.subscribe(
            &name,
            Arc::new(move |payload: &Value| {
                callback(reshape_list::<TokenActivityWire, TokenActivity>(payload))
            }),
        )
    }

    /// Trades for one token
    ///
    /// Channel: `dex-trades:<chain>_<token>`
    pub fn subscribe_trades<F>(
        &self,
        chain: &str,
        token_address: &str,
        callback: F,
    ) -> Result<SubscriptionHandle>
    where
        F: Fn(Vec<TokenActivity>) + Send + Sync + 'static,
    {
        let name = channel::trades_channel(chain, token_address);
        self.subscribe(
            &name,
            Arc::new(move |payload: &Value| {
                callback(reshape_list::<TokenActivityWire, TokenActivity>(payload))
            }),
        )
    }

    /// All token balances of a wallet
    ///
    /// Channel: `dex-balance:<chain>_<wallet>`
    pub fn subscribe_balances<F>(
        &self,
        chain: &str,
        wallet_address: &str,
        callback: F,
    ) -> Result<SubscriptionHandle>
    where
        F: Fn(Vec<Balance>) + Send + Sync + 'static,
    {
        let name = channel::balance_channel(chain, wallet_address);
        self.subscribe(
            &name,
            Arc::new(move |payload: &Value| callback(reshape_list::<BalanceWire, Balance>(payload))),
        )
    }

    /// Balance of one token in one wallet
    ///
    /// Channel: `dex-token-balance:<chain>_<token>_<wallet>`
    pub fn subscribe_token_balance<F>(
        &self,
        chain: &str,
        token_address: &str,
        wallet_address: &str,
        callback: F,
    ) -> Result<SubscriptionHandle>
    where
        F: Fn(Balance) + Send + Sync + 'static,
    {
        let name = channel::token_balance_channel(chain, token_address, wallet_address);
        self.subscribe(
            &name,
            Arc::new(move |payload: &Value| callback(reshape::<BalanceWire, Balance>(payload))),
        )
    }
}
