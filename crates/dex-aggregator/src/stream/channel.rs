/*
[INPUT]:  Chain id, token/wallet addresses, candle resolution
[OUTPUT]: Channel names understood by the real-time service
[POS]:    Stream layer - channel naming
[UPDATE]: When the server adds channel families
*/

/// Channel families published by the real-time service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Candle,
    TokenStats,
    TokenActivities,
    Trades,
    Balance,
    TokenBalance,
}

impl ChannelKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            ChannelKind::Candle => "dex-candle",
            ChannelKind::TokenStats => "dex-token-stats",
            ChannelKind::TokenActivities => "dex-token-activities",
            ChannelKind::Trades => "dex-trades",
            ChannelKind::Balance => "dex-balance",
            ChannelKind::TokenBalance => "dex-token-balance",
        }
    }

    /// `<prefix>:<chain>_<part>[_<part>...]`
    pub fn channel(&self, chain: &str, parts: &[&str]) -> String {
        let mut name = format!("{}:{}", self.prefix(), chain);
        for part in parts {
            name.push('_');
            name.push_str(part);
        }
        name
    }
}

pub fn candle_channel(chain: &str, token_address: &str, resolution: &str) -> String {
    ChannelKind::Candle.channel(chain, &[token_address, resolution])
}

pub fn token_stats_channel(chain: &str, token_address: &str) -> String {
    ChannelKind::TokenStats.channel(chain, &[token_address])
}

pub fn token_activities_channel(chain: &str, token_address: &str) -> String {
    ChannelKind::TokenActivities.channel(chain, &[token_address])
}

pub fn trades_channel(chain: &str, token_address: &str) -> String {
    ChannelKind::Trades.channel(chain, &[token_address])
}

pub fn balance_channel(chain: &str, wallet_address: &str) -> String {
    ChannelKind::Balance.channel(chain, &[wallet_address])
}

pub fn token_balance_channel(chain: &str, token_address: &str, wallet_address: &str) -> String {
    ChannelKind::TokenBalance.channel(chain, &[token_address, wallet_address])
}
