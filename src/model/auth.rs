//! Auth variant carried on a `Provider`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where an API key should be placed on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiKeyLocation {
    /// As an HTTP header
    Header,
    /// As a query-string parameter
    Query,
    /// As a cookie
    Cookie,
}

/// Authentication configuration for a provider.
///
/// Deserialized from a JSON object that carries either `auth_type` or the
/// legacy alias `type` as its discriminator, matching the providers-file
/// convention described for `provider_type`/`type`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "auth_type", rename_all = "snake_case")]
pub enum Auth {
    /// A pre-shared API key, injected via header/query/cookie.
    ApiKey {
        /// The key value itself (post variable-substitution).
        key: String,
        /// Header/query/cookie name to carry the key under.
        var_name: String,
        /// Where to place the key.
        location: ApiKeyLocation,
    },
    /// HTTP Basic authentication.
    Basic {
        /// Username
        username: String,
        /// Password
        password: String,
    },
    /// OAuth2 client-credentials grant, token cached per `client_id`.
    OAuth2 {
        /// Token endpoint URL
        token_url: String,
        /// Client id
        client_id: String,
        /// Client secret
        client_secret: String,
        /// Requested scope, space-delimited; empty means "no scope param".
        #[serde(default)]
        scope: String,
    },
}

impl<'de> Deserialize<'de> for Auth {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let mut value = Value::deserialize(deserializer)?;
        let obj = value
            .as_object_mut()
            .ok_or_else(|| serde::de::Error::custom("auth must be a JSON object"))?;

        // Accept the legacy alias `type` for `auth_type`.
        if !obj.contains_key("auth_type") {
            if let Some(t) = obj.remove("type") {
                obj.insert("auth_type".to_string(), t);
            }
        }

        #[derive(Deserialize)]
        #[serde(tag = "auth_type", rename_all = "snake_case")]
        enum Shadow {
            ApiKey {
                key: String,
                var_name: String,
                location: ApiKeyLocation,
            },
            Basic {
                username: String,
                password: String,
            },
            OAuth2 {
                token_url: String,
                client_id: String,
                client_secret: String,
                #[serde(default)]
                scope: String,
            },
        }

        let shadow = Shadow::deserialize(value).map_err(serde::de::Error::custom)?;
        Ok(match shadow {
            Shadow::ApiKey {
                key,
                var_name,
                location,
            } => Auth::ApiKey {
                key,
                var_name,
                location,
            },
            Shadow::Basic { username, password } => Auth::Basic { username, password },
            Shadow::OAuth2 {
                token_url,
                client_id,
                client_secret,
                scope,
            } => Auth::OAuth2 {
                token_url,
                client_id,
                client_secret,
                scope,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auth_type_key_is_accepted() {
        let value = serde_json::json!({
            "auth_type": "api_key",
            "key": "secret",
            "var_name": "X-API-Key",
            "location": "header",
        });
        let auth: Auth = serde_json::from_value(value).unwrap();
        assert!(matches!(auth, Auth::ApiKey { .. }));
    }

    #[test]
    fn legacy_type_alias_is_accepted() {
        let value = serde_json::json!({
            "type": "basic",
            "username": "alice",
            "password": "hunter2",
        });
        let auth: Auth = serde_json::from_value(value).unwrap();
        match auth {
            Auth::Basic { username, password } => {
                assert_eq!(username, "alice");
                assert_eq!(password, "hunter2");
            }
            _ => panic!("expected basic auth"),
        }
    }

    #[test]
    fn oauth2_scope_defaults_to_empty() {
        let value = serde_json::json!({
            "auth_type": "oauth2",
            "token_url": "https://auth.example/token",
            "client_id": "id",
            "client_secret": "secret",
        });
        let auth: Auth = serde_json::from_value(value).unwrap();
        match auth {
            Auth::OAuth2 { scope, .. } => assert_eq!(scope, ""),
            _ => panic!("expected oauth2 auth"),
        }
    }

    #[test]
    fn non_object_auth_is_rejected() {
        let value = serde_json::json!("not-an-object");
        assert!(serde_json::from_value::<Auth>(value).is_err());
    }
}
