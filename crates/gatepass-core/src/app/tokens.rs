//! TokenService - 返却トークンの発行と検証
//!
//! # ワイヤ形式
//! ```text
//! GATEPASS1:<pass_number>:<pass_id>:<YYYYMMDDHHMMSS>:<session_id>:<hmac_sha256_hex>
//! ```
//! - フィールド区切りは `:`。フィールド内の `\` は `\\`、`:` は `\:` にエスケープ
//! - 署名は先頭 5 フィールド（エスケープ済みのまま `:` で連結）に対する HMAC-SHA256
//! - タイムスタンプは UTC
//!
//! ステッカー用の `STICKER1:<pass_number>:<pass_id>` は署名なしで、返却証明には使えません。
//!
//! # 検証順序
//! フィールド数 → セッション → 有効期限 → 署名

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha2::Sha256;
use tracing::debug;

use crate::config::{ConfigError, MIN_SECRET_BYTES};
use crate::domain::errors::TokenError;
use crate::domain::ids::PassId;
use crate::ports::Clock;

type HmacSha256 = Hmac<Sha256>;

pub const TOKEN_TAG: &str = "GATEPASS1";
pub const STICKER_TAG: &str = "STICKER1";
const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";
const TOKEN_FIELDS: usize = 6;
/// HMAC-SHA256 の hex 表現（小文字のみ）
const SIGNATURE_HEX_LEN: usize = 64;

/// 発行したトークンとそのセッション ID
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IssuedToken {
    pub token: String,
    pub session_id: String,
}

/// 検証済みトークンの中身
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReturnToken {
    pub pass_number: String,
    pub pass_id: PassId,
    pub issued_at: DateTime<Utc>,
    pub session_id: String,
}

pub struct TokenService {
    mac: HmacSha256,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl TokenService {
    pub fn new(secret: &[u8], ttl: Duration, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        if secret.len() < MIN_SECRET_BYTES {
            return Err(ConfigError::Validation(format!(
                "token secret must be at least {MIN_SECRET_BYTES} bytes"
            )));
        }
        let mac = HmacSha256::new_from_slice(secret)
            .map_err(|e| ConfigError::Validation(format!("token secret rejected: {e}")))?;
        Ok(Self { mac, ttl, clock })
    }

    /// 8 バイトの乱数（hex）
    pub fn mint_session_id() -> String {
        hex::encode(rand::random::<[u8; 8]>())
    }

    /// トークンを発行。`session_id` が None なら新しいセッションを作る
    pub fn generate(
        &self,
        pass_id: PassId,
        pass_number: &str,
        session_id: Option<&str>,
    ) -> IssuedToken {
        let session_id = session_id.map_or_else(Self::mint_session_id, str::to_string);
        let issued_at = self.clock.now().format(TIMESTAMP_FORMAT).to_string();
        let payload = join_fields(&[
            TOKEN_TAG,
            pass_number,
            &pass_id.to_string(),
            &issued_at,
            &session_id,
        ]);
        let signature = self.sign(&payload);
        IssuedToken {
            token: format!("{payload}:{signature}"),
            session_id,
        }
    }

    /// 物品タグ用のステッカーコード（署名なし）
    pub fn sticker(&self, pass_id: PassId, pass_number: &str) -> String {
        join_fields(&[STICKER_TAG, pass_number, &pass_id.to_string()])
    }

    pub fn verify(
        &self,
        token: &str,
        expected_session: Option<&str>,
    ) -> Result<ReturnToken, TokenError> {
        let fields = split_fields(token.trim())?;
        match fields.first().map(String::as_str) {
            Some(TOKEN_TAG) => {}
            Some(STICKER_TAG) => return Err(TokenError::NotReturnProof),
            _ => return Err(TokenError::Malformed("unknown type tag".into())),
        }
        if fields.len() != TOKEN_FIELDS {
            return Err(TokenError::Malformed(format!(
                "expected {TOKEN_FIELDS} fields, got {}",
                fields.len()
            )));
        }
        let (pass_number, pass_id, timestamp, session_id, signature) = (
            fields[1].as_str(),
            fields[2].as_str(),
            fields[3].as_str(),
            fields[4].as_str(),
            fields[5].as_str(),
        );

        if let Some(expected) = expected_session
            && expected != session_id
        {
            debug!(pass_number = %pass_number, "return token session mismatch");
            return Err(TokenError::SessionMismatch);
        }

        let issued_at = NaiveDateTime::parse_from_str(timestamp, TIMESTAMP_FORMAT)
            .map_err(|_| TokenError::Malformed("bad timestamp".into()))?
            .and_utc();
        let age = self.clock.now() - issued_at;
        if age > self.ttl {
            return Err(TokenError::Expired {
                age_secs: age.num_seconds(),
            });
        }

        let payload = join_fields(&[TOKEN_TAG, pass_number, pass_id, timestamp, session_id]);
        if !is_canonical_signature(signature) {
            return Err(TokenError::Tampered);
        }
        let signature = hex::decode(signature).map_err(|_| TokenError::Tampered)?;
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        mac.verify_slice(&signature).map_err(|_| TokenError::Tampered)?;

        let pass_id: PassId = pass_id
            .parse()
            .map_err(|_| TokenError::Malformed("bad pass id".into()))?;
        Ok(ReturnToken {
            pass_number: pass_number.to_string(),
            pass_id,
            issued_at,
            session_id: session_id.to_string(),
        })
    }

    fn sign(&self, payload: &str) -> String {
        let mut mac = self.mac.clone();
        mac.update(payload.as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }
}

/// `sign` が出力する形（小文字 hex 64 文字）以外は受け付けない
fn is_canonical_signature(signature: &str) -> bool {
    signature.len() == SIGNATURE_HEX_LEN
        && signature
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn escape_field(field: &str) -> String {
    let mut out = String::with_capacity(field.len());
    for c in field.chars() {
        if c == '\\' || c == ':' {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn join_fields(fields: &[&str]) -> String {
    fields
        .iter()
        .map(|f| escape_field(f))
        .collect::<Vec<_>>()
        .join(":")
}

/// `:` で分割し、各フィールドのエスケープを解く
fn split_fields(token: &str) -> Result<Vec<String>, TokenError> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut chars = token.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => match chars.next() {
                Some(escaped @ ('\\' | ':')) => current.push(escaped),
                _ => return Err(TokenError::Malformed("bad escape sequence".into())),
            },
            ':' => fields.push(std::mem::take(&mut current)),
            other => current.push(other),
        }
    }
    fields.push(current);
    Ok(fields)
}
