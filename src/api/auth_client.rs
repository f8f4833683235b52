use crate::{
    api::client::ApiClient,
    error::Result,
    models::{RegisterRequest, TokenResponse, Transaction, TransactionsResponse, UserProfile},
};
use serde_json::Value;

#[derive(Clone)]
pub struct AuthService {
    api: ApiClient,
}

impl AuthService {
    pub fn new(api: ApiClient) -> Self {
        Self { api }
    }

    /// Exchanges credentials for a token and stores it for the session.
    pub async fn login(&self, username: &str, password: &str) -> Result<TokenResponse> {
        let path = self.api.endpoints().login.clone();
        let token: TokenResponse = self
            .api
            .post_urlencoded(&path, &[("username", username), ("password", password)], false)
            .await?;
        self.api.credentials().set(token.access_token.clone());
        log::info!("Logged in as {}", username);
        Ok(token)
    }

    pub async fn register(
        &self,
        username: &str,
        password: &str,
        email: Option<&str>,
    ) -> Result<Value> {
        let path = self.api.endpoints().register.clone();
        let request = RegisterRequest {
            username: username.to_string(),
            password: password.to_string(),
            email: email.map(String::from),
        };
        self.api.post_json(&path, &request, false).await
    }

    pub async fn current_user(&self) -> Result<UserProfile> {
        let path = self.api.endpoints().user_me.clone();
        self.api.get(&path, true).await
    }

    pub async fn transactions(&self) -> Result<Vec<Transaction>> {
        let path = self.api.endpoints().user_transactions.clone();
        let response: TransactionsResponse = self.api.get(&path, true).await?;
        Ok(response.into_vec())
    }

    pub fn logout(&self) {
        self.api.credentials().clear();
        log::info!("Logged out");
    }

    pub fn is_logged_in(&self) -> bool {
        self.api.credentials().is_authenticated()
    }
}
