//! Provider rate table.
//!
//! Single source of truth for synthesis cost estimation. The cost paid for
//! an entry is stored on its cache row; every later hit accrues the same
//! amount as cost saved. Prices are in USD and come from provider pricing
//! pages; update the constants here when a provider changes its rates.

/// Pricing unit for a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateUnit {
    /// Price per 1,000 characters of input text.
    Per1KChars,
    /// Price per 1,000,000 characters of input text.
    Per1MChars,
}

/// Pricing information for one provider.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProviderRate {
    /// Price amount in USD.
    pub price: f64,
    /// Unit for the price.
    pub unit: RateUnit,
}

impl ProviderRate {
    /// Cost in USD of synthesizing `chars` characters at this rate.
    pub fn cost(&self, chars: usize) -> f64 {
        let chars = chars as f64;
        match self.unit {
            RateUnit::Per1KChars => self.price * chars / 1_000.0,
            RateUnit::Per1MChars => self.price * chars / 1_000_000.0,
        }
    }
}

/// Applied when a provider is missing from the table: deliberately on the
/// expensive side so unknown providers are never under-counted in
/// cost-saved accounting.
const DEFAULT_RATE: ProviderRate = ProviderRate {
    price: 16.0,
    unit: RateUnit::Per1MChars,
};

/// Looks up the rate for a provider identifier.
pub fn provider_rate(provider: &str) -> ProviderRate {
    match provider {
        // Local subprocess synthesis costs nothing but CPU.
        "espeak" => ProviderRate {
            price: 0.0,
            unit: RateUnit::Per1KChars,
        },
        "http" => ProviderRate {
            price: 0.016,
            unit: RateUnit::Per1KChars,
        },
        "elevenlabs" => ProviderRate {
            price: 0.30,
            unit: RateUnit::Per1KChars,
        },
        "google" => ProviderRate {
            price: 16.0,
            unit: RateUnit::Per1MChars,
        },
        "azure" => ProviderRate {
            price: 15.0,
            unit: RateUnit::Per1MChars,
        },
        _ => DEFAULT_RATE,
    }
}

/// Cost in USD of synthesizing `chars` characters with `provider`.
pub fn synthesis_cost(provider: &str, chars: usize) -> f64 {
    provider_rate(provider).cost(chars)
}
