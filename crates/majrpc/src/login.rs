//! The oauth2 sign-in sequence.

use std::time::Duration;

use majrpc_client::Caller;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::{Account, MajrpcError};

/// Passport-token auth, the only flow the gateway accepts from web clients.
const AUTH_TYPE: u64 = 8;

/// A fresh account sometimes isn't visible to `oauth2Check` immediately
/// after `oauth2Auth`; the observed contract is one retry after this wait.
const CHECK_RETRY_DELAY: Duration = Duration::from_secs(2);

pub(crate) async fn log_in<C: Caller>(
    caller: &C,
    uid: &str,
    access_token: &str,
    version: &str,
    client_version: &str,
) -> Result<Account, MajrpcError> {
    let auth = caller
        .call(
            "oauth2Auth",
            json!({
                "type": AUTH_TYPE,
                "code": access_token,
                "uid": uid,
                "client_version_string": client_version,
            }),
        )
        .await?;
    let token = auth
        .get("access_token")
        .and_then(Value::as_str)
        .ok_or_else(|| {
            MajrpcError::LoginFailed("oauth2Auth returned no access token".into())
        })?
        .to_string();

    let check_args = json!({ "type": AUTH_TYPE, "access_token": token });
    let check = caller.call("oauth2Check", check_args.clone()).await?;
    let has_account = check
        .get("has_account")
        .and_then(Value::as_bool)
        .unwrap_or(false);
    if !has_account {
        tracing::info!(uid, "account not visible yet, retrying check once");
        tokio::time::sleep(CHECK_RETRY_DELAY).await;
        caller.call("oauth2Check", check_args).await?;
    }

    let login = caller
        .call(
            "oauth2Login",
            json!({
                "type": AUTH_TYPE,
                "currency_platforms": [2, 9],
                "access_token": token,
                "reconnect": false,
                "device": {
                    "platform": "pc",
                    "hardware": "pc",
                    "os": "windows",
                    "os_version": "win10",
                    "is_browser": true,
                    "software": "Chrome",
                    "sale_platform": "web",
                },
                "random_key": Uuid::new_v4().to_string(),
                "client_version": { "resource": version },
                "client_version_string": client_version,
            }),
        )
        .await?;

    let account = login
        .get("account")
        .filter(|a| !a.is_null())
        .ok_or_else(|| {
            MajrpcError::LoginFailed(format!("no account for uid {uid}"))
        })?;
    let account = Account {
        account_id: account
            .get("account_id")
            .and_then(Value::as_u64)
            .unwrap_or_default(),
        nickname: account
            .get("nickname")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    };
    tracing::info!(uid, account_id = account.account_id, "logged in");
    Ok(account)
}
