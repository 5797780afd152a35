//! QR payload rendering for member cards. Rasterisation happens in the
//! front-end; the core only needs an opaque string per account code.

use base64::Engine;
use lounge_core::types::AccountCode;
use lounge_core::LoungeResult;

pub trait QrRenderer: Send + Sync {
    fn render(&self, code: &AccountCode) -> LoungeResult<String>;
}

/// Encodes the code as a base64 `data:` URI that any QR widget can consume.
pub struct DataUriRenderer;

impl QrRenderer for DataUriRenderer {
    fn render(&self, code: &AccountCode) -> LoungeResult<String> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(code.as_str());
        Ok(format!("data:text/plain;base64,{encoded}"))
    }
}
