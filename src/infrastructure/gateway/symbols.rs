//! Symbol metadata owned by the gateway adapter.
//!
//! Base/quote splits differ per venue, so the authoritative mapping is
//! registered on the adapter rather than inferred from the symbol text.
//! The USDT-suffix split remains only as a fallback for unregistered
//! symbols.

use std::collections::HashMap;
use std::sync::RwLock;

pub struct SymbolTable {
    pairs: RwLock<HashMap<String, (String, String)>>,
}

impl SymbolTable {
    pub fn new() -> Self {
        Self {
            pairs: RwLock::new(HashMap::new()),
        }
    }

    pub fn register(&self, symbol: &str, base: &str, quote: &str) {
        self.pairs
            .write()
            .expect("symbol table poisoned")
            .insert(symbol.to_string(), (base.to_string(), quote.to_string()));
    }

    /// Split a symbol into `(base, quote)`. Registered metadata wins;
    /// otherwise fall back to a USDT suffix, then to a 3-char base.
    pub fn split(&self, symbol: &str) -> (String, String) {
        if let Some((base, quote)) = self
            .pairs
            .read()
            .expect("symbol table poisoned")
            .get(symbol)
        {
            return (base.clone(), quote.clone());
        }

        if let Some(base) = symbol.strip_suffix("USDT") {
            if !base.is_empty() {
                return (base.to_string(), "USDT".to_string());
            }
        }

        let split_at = symbol.len().min(3);
        (
            symbol[..split_at].to_string(),
            symbol[split_at..].to_string(),
        )
    }
}

impl Default for SymbolTable {
    fn default() -> Self {
        Self::new()
    }
}
