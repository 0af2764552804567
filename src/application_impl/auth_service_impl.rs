use crate::application_impl::TokenLedger;
use crate::application_port::*;
use crate::domain_model::*;
use crate::domain_port::*;
use argon2::password_hash::rand_core::OsRng;
use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use chrono::{DateTime, Utc};
use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Default)]
pub struct Argon2PasswordHasher {
    params: Option<argon2::Params>,
}

impl Argon2PasswordHasher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use explicit cost parameters instead of the argon2 defaults.
    pub fn with_params(params: argon2::Params) -> Self {
        Argon2PasswordHasher {
            params: Some(params),
        }
    }

    fn argon2(&self) -> Argon2<'static> {
        match &self.params {
            Some(p) => Argon2::new(argon2::Algorithm::Argon2id, argon2::Version::V0x13, p.clone()),
            None => Argon2::default(),
        }
    }
}

#[async_trait::async_trait]
impl CredentialHasher for Argon2PasswordHasher {
    async fn hash_password(&self, password: &str) -> Result<String, AuthError> {
        let salt = argon2::password_hash::SaltString::generate(&mut OsRng);
        let hash = self
            .argon2()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::InternalError(e.to_string()))?
            .to_string();
        Ok(hash)
    }

    async fn verify_password(
        &self,
        password: &str,
        password_hash: &str,
    ) -> Result<bool, AuthError> {
        let parsed = PasswordHash::new(password_hash)
            .map_err(|e| AuthError::InternalError(format!("invalid PHC hash: {e}")))?;

        // parameters are read from the PHC string
        match Argon2::default().verify_password(password.as_bytes(), &parsed) {
            Ok(_) => Ok(true),
            Err(argon2::password_hash::Error::Password) => Ok(false),
            Err(e) => Err(AuthError::InternalError(format!("verify error: {e}"))),
        }
    }
}

#[derive(Clone)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: String,
    pub access_ttl: Duration,
    pub refresh_ttl: Duration,
    pub access_secret: Vec<u8>,
    pub refresh_secret: Vec<u8>,
}

impl std::fmt::Debug for JwtConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtConfig")
            .field("issuer", &self.issuer)
            .field("audience", &self.audience)
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    email: String,
    role: Role,
    exp: i64,
    iat: i64,
    iss: String,
    aud: String,
    jti: String,
}

impl Claims {
    fn into_verified(self) -> Result<VerifiedToken, AuthError> {
        let user_id = self
            .sub
            .parse::<UserId>()
            .map_err(|_| AuthError::TokenInvalid)?;
        let expires_at = DateTime::from_timestamp(self.exp, 0).ok_or(AuthError::TokenInvalid)?;
        Ok(VerifiedToken {
            subject: TokenSubject {
                user_id,
                email: self.email,
                role: self.role,
            },
            jti: self.jti,
            expires_at,
        })
    }
}

pub struct JwtHs256Codec {
    cfg: JwtConfig,
}

impl JwtHs256Codec {
    pub fn new(cfg: JwtConfig) -> Self {
        JwtHs256Codec { cfg }
    }

    #[inline]
    fn gen_jti() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    fn encode_token(
        &self,
        subject: &TokenSubject,
        ttl: Duration,
        secret: &[u8],
    ) -> Result<(String, DateTime<Utc>), AuthError> {
        let iat_dt = Utc::now();
        let exp_dt = iat_dt + ttl;
        let claims = Claims {
            sub: subject.user_id.to_string(),
            email: subject.email.clone(),
            role: subject.role,
            exp: exp_dt.timestamp(),
            iat: iat_dt.timestamp(),
            iss: self.cfg.issuer.clone(),
            aud: self.cfg.audience.clone(),
            jti: Self::gen_jti(),
        };
        let token = encode(
            &Header::new(Algorithm::HS256),
            &claims,
            &EncodingKey::from_secret(secret),
        )
        .map_err(|e| AuthError::InternalError(e.to_string()))?;
        // exp is carried with second precision
        let exp_dt = DateTime::from_timestamp(claims.exp, 0).unwrap_or(exp_dt);
        Ok((token, exp_dt))
    }

    fn validation(&self, validate_exp: bool) -> Validation {
        let mut v = Validation::new(Algorithm::HS256);
        v.validate_exp = validate_exp;
        v.leeway = 0;
        v.set_audience(&[self.cfg.audience.clone()]);
        v.set_issuer(&[self.cfg.issuer.clone()]);
        v
    }

    fn decode_token(&self, token: &str, secret: &[u8]) -> Result<VerifiedToken, AuthError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret),
            &self.validation(true),
        )
        .map_err(|e| match e.kind() {
            ErrorKind::ExpiredSignature => AuthError::TokenExpired,
            _ => AuthError::TokenInvalid,
        })?;
        data.claims.into_verified()
    }

    fn signed_expiry(&self, token: &str, secret: &[u8]) -> Option<DateTime<Utc>> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(secret),
            &self.validation(false),
        )
        .ok()?;
        DateTime::from_timestamp(data.claims.exp, 0)
    }
}

#[async_trait::async_trait]
impl TokenCodec for JwtHs256Codec {
    async fn issue_pair(&self, subject: &TokenSubject) -> Result<TokenPair, AuthError> {
        let (access, access_exp) =
            self.encode_token(subject, self.cfg.access_ttl, &self.cfg.access_secret)?;
        let (refresh, refresh_exp) =
            self.encode_token(subject, self.cfg.refresh_ttl, &self.cfg.refresh_secret)?;
        Ok(TokenPair {
            access_token: AccessToken(access),
            refresh_token: RefreshToken(refresh),
            access_token_expires_at: access_exp,
            refresh_token_expires_at: refresh_exp,
        })
    }

    async fn verify_access_token(&self, token: &AccessToken) -> Result<VerifiedToken, AuthError> {
        self.decode_token(token.as_str(), &self.cfg.access_secret)
    }

    async fn verify_refresh_token(
        &self,
        token: &RefreshToken,
    ) -> Result<VerifiedToken, AuthError> {
        self.decode_token(token.as_str(), &self.cfg.refresh_secret)
    }

    async fn access_token_expiry(&self, token: &AccessToken) -> Option<DateTime<Utc>> {
        self.signed_expiry(token.as_str(), &self.cfg.access_secret)
    }

    async fn refresh_token_expiry(&self, token: &RefreshToken) -> Option<DateTime<Utc>> {
        self.signed_expiry(token.as_str(), &self.cfg.refresh_secret)
    }

    fn access_ttl(&self) -> Duration {
        self.cfg.access_ttl
    }

    fn refresh_ttl(&self) -> Duration {
        self.cfg.refresh_ttl
    }
}

pub struct RealAuthService {
    user_repo: Arc<dyn UserRepo>,
    credential_hasher: Arc<dyn CredentialHasher>,
    token_codec: Arc<dyn TokenCodec>,
    ledger: TokenLedger,
    blacklist_on_rotation: bool,
}

impl RealAuthService {
    pub fn new(
        user_repo: Arc<dyn UserRepo>,
        credential_hasher: Arc<dyn CredentialHasher>,
        token_codec: Arc<dyn TokenCodec>,
        ledger: TokenLedger,
    ) -> Self {
        Self {
            user_repo,
            credential_hasher,
            token_codec,
            ledger,
            blacklist_on_rotation: true,
        }
    }

    pub fn blacklist_on_rotation(mut self, enabled: bool) -> Self {
        self.blacklist_on_rotation = enabled;
        self
    }

    fn ttl_secs(until: DateTime<Utc>) -> u64 {
        let secs = (until - Utc::now()).num_seconds();
        if secs <= 0 { 1 } else { secs as u64 }
    }

    fn remaining_or(until: Option<DateTime<Utc>>, fallback: Duration) -> u64 {
        match until {
            Some(at) => Self::ttl_secs(at),
            None => fallback.as_secs().max(1),
        }
    }

    /// Issue a pair for `user` and record it in the ledger and the durable list.
    async fn issue_session(&self, user: UserRecord) -> Result<AuthSession, AuthError> {
        let subject = TokenSubject {
            user_id: user.user_id,
            email: user.email.clone(),
            role: user.role,
        };
        let tokens = self.token_codec.issue_pair(&subject).await?;

        self.ledger
            .record_access_issued(
                user.user_id,
                tokens.access_token.as_str(),
                Self::ttl_secs(tokens.access_token_expires_at),
            )
            .await?;
        self.ledger
            .record_refresh_issued(
                tokens.refresh_token.as_str(),
                user.user_id,
                Self::ttl_secs(tokens.refresh_token_expires_at),
            )
            .await?;
        self.user_repo
            .update_refresh_tokens(user.user_id, RefreshTokenChange::Add(&tokens.refresh_token))
            .await?;

        Ok(AuthSession { user, tokens })
    }

    async fn stamp_login(&self, mut user: UserRecord) -> Result<UserRecord, AuthError> {
        let now = Utc::now();
        self.user_repo.set_last_login(user.user_id, now).await?;
        user.last_login = Some(now);
        Ok(user)
    }
}

#[async_trait::async_trait]
impl AuthService for RealAuthService {
    async fn register(&self, input: RegisterInput) -> Result<AuthSession, AuthError> {
        let RegisterInput {
            email,
            password,
            first_name,
            last_name,
        } = input;
        let email = normalize_email(&email);

        if self.user_repo.find_by_email(&email).await?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let password_hash = self.credential_hasher.hash_password(&password).await?;
        let user = self
            .user_repo
            .create(NewUser {
                user_id: UserId::new_random(),
                email,
                password_hash,
                first_name: first_name.trim().to_string(),
                last_name: last_name.trim().to_string(),
                role: Role::User,
            })
            .await?;
        tracing::info!(user_id = %user.user_id, "user registered");

        let user = self.stamp_login(user).await?;
        self.issue_session(user).await
    }

    async fn login(&self, input: LoginInput) -> Result<AuthSession, AuthError> {
        let LoginInput { email, password } = input;

        let rec = self
            .user_repo
            .find_credentials_by_email(&email)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !rec.user.is_active {
            tracing::debug!(user_id = %rec.user.user_id, "login refused: inactive account");
            return Err(AuthError::InvalidCredentials);
        }

        let ok = self
            .credential_hasher
            .verify_password(&password, &rec.password_hash)
            .await?;
        if !ok {
            return Err(AuthError::InvalidCredentials);
        }

        let user = self.stamp_login(rec.user).await?;
        self.issue_session(user).await
    }

    async fn logout(
        &self,
        user_id: UserId,
        access_token: &AccessToken,
        refresh_token: Option<&RefreshToken>,
    ) -> Result<(), AuthError> {
        self.ledger
            .revoke_access(user_id, access_token.as_str())
            .await?;
        let access_exp = self.token_codec.access_token_expiry(access_token).await;
        self.ledger
            .blacklist(
                access_token.as_str(),
                Self::remaining_or(access_exp, self.token_codec.access_ttl()),
            )
            .await?;

        if let Some(refresh) = refresh_token {
            match self.ledger.resolve_refresh_owner(refresh.as_str()).await? {
                Some(owner) if owner != user_id => {
                    tracing::debug!(%user_id, "logout ignored a refresh token owned by another user");
                }
                _ => {
                    self.ledger.revoke_refresh(refresh.as_str()).await?;
                    self.user_repo
                        .update_refresh_tokens(user_id, RefreshTokenChange::Remove(refresh))
                        .await?;
                    let refresh_exp = self.token_codec.refresh_token_expiry(refresh).await;
                    self.ledger
                        .blacklist(
                            refresh.as_str(),
                            Self::remaining_or(refresh_exp, self.token_codec.refresh_ttl()),
                        )
                        .await?;
                }
            }
        }

        tracing::info!(%user_id, "user logged out");
        Ok(())
    }

    async fn refresh(&self, refresh_token: &RefreshToken) -> Result<AuthSession, AuthError> {
        let verified = self.token_codec.verify_refresh_token(refresh_token).await?;
        let user_id = verified.subject.user_id;

        if self.ledger.is_blacklisted(refresh_token.as_str()).await? {
            tracing::debug!(%user_id, "refresh refused: token blacklisted");
            return Err(AuthError::TokenRevoked);
        }

        // rotation: the old token leaves both stores before anything is issued
        let Some(owner) = self.ledger.consume_refresh(refresh_token.as_str()).await? else {
            tracing::debug!(%user_id, "refresh refused: no ledger owner");
            return Err(AuthError::TokenRevoked);
        };
        if owner != user_id {
            tracing::debug!(%user_id, %owner, "refresh refused: owner mismatch");
            return Err(AuthError::TokenInvalid);
        }
        let listed = self
            .user_repo
            .update_refresh_tokens(user_id, RefreshTokenChange::Remove(refresh_token))
            .await?;
        if !listed {
            tracing::debug!(%user_id, "refresh refused: token not in the persisted list");
            return Err(AuthError::TokenRevoked);
        }

        let user = match self.user_repo.find_by_id(user_id).await? {
            Some(user) if user.is_active => user,
            _ => {
                tracing::debug!(%user_id, "refresh refused: account missing or inactive");
                return Err(AuthError::TokenRevoked);
            }
        };

        if self.blacklist_on_rotation {
            self.ledger
                .blacklist(
                    refresh_token.as_str(),
                    Self::ttl_secs(verified.expires_at),
                )
                .await?;
        }

        self.issue_session(user).await
    }

    async fn validate_access(
        &self,
        user_id: UserId,
        access_token: &AccessToken,
    ) -> Result<bool, AuthError> {
        if self.ledger.is_blacklisted(access_token.as_str()).await? {
            return Ok(false);
        }
        Ok(self
            .ledger
            .is_access_valid(user_id, access_token.as_str())
            .await?)
    }

    async fn authenticate(&self, bearer: &str) -> Result<Principal, AuthError> {
        let access_token = AccessToken(bearer.to_string());
        let verified = self.token_codec.verify_access_token(&access_token).await?;

        if !self
            .validate_access(verified.subject.user_id, &access_token)
            .await?
        {
            tracing::debug!(user_id = %verified.subject.user_id, "access token not in ledger");
            return Err(AuthError::TokenRevoked);
        }

        Ok(Principal {
            subject: verified.subject,
            access_token,
            expires_at: verified.expires_at,
        })
    }

    async fn logout_all_devices(&self, user_id: UserId) -> Result<(), AuthError> {
        if let Some(rec) = self.user_repo.find_credentials_by_id(user_id).await? {
            for token in &rec.refresh_tokens {
                self.ledger.revoke_refresh(token).await?;
            }
        }
        self.user_repo
            .update_refresh_tokens(user_id, RefreshTokenChange::Clear)
            .await?;

        let revoked = self
            .ledger
            .revoke_all_access(user_id, self.token_codec.access_ttl().as_secs().max(1))
            .await?;
        tracing::info!(%user_id, revoked, "user logged out of all devices");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> JwtHs256Codec {
        JwtHs256Codec::new(JwtConfig {
            issuer: "mediavault".into(),
            audience: "mediavault-clients".into(),
            access_ttl: Duration::from_secs(900),
            refresh_ttl: Duration::from_secs(3600),
            access_secret: b"access-secret".to_vec(),
            refresh_secret: b"refresh-secret".to_vec(),
        })
    }

    fn subject() -> TokenSubject {
        TokenSubject {
            user_id: UserId::new_random(),
            email: "a@example.com".into(),
            role: Role::User,
        }
    }

    #[tokio::test]
    async fn pair_round_trips_through_its_own_secret() {
        let codec = codec();
        let subject = subject();
        let pair = codec.issue_pair(&subject).await.unwrap();

        let access = codec.verify_access_token(&pair.access_token).await.unwrap();
        assert_eq!(access.subject, subject);
        let refresh = codec
            .verify_refresh_token(&pair.refresh_token)
            .await
            .unwrap();
        assert_eq!(refresh.subject, subject);
        assert_eq!(refresh.expires_at, pair.refresh_token_expires_at);
    }

    #[tokio::test]
    async fn tokens_do_not_cross_secrets() {
        let codec = codec();
        let pair = codec.issue_pair(&subject()).await.unwrap();

        let as_refresh = RefreshToken(pair.access_token.0.clone());
        assert!(matches!(
            codec.verify_refresh_token(&as_refresh).await,
            Err(AuthError::TokenInvalid)
        ));
        let as_access = AccessToken(pair.refresh_token.0.clone());
        assert!(matches!(
            codec.verify_access_token(&as_access).await,
            Err(AuthError::TokenInvalid)
        ));
    }

    #[tokio::test]
    async fn tokens_issued_together_differ() {
        let codec = codec();
        let s = subject();
        let a = codec.issue_pair(&s).await.unwrap();
        let b = codec.issue_pair(&s).await.unwrap();
        assert_ne!(a.access_token, b.access_token);
        assert_ne!(a.refresh_token, b.refresh_token);
    }

    #[tokio::test]
    async fn expired_tokens_are_reported_and_still_expose_expiry() {
        let codec = JwtHs256Codec::new(JwtConfig {
            access_ttl: Duration::from_secs(0),
            ..codec().cfg
        });
        let pair = codec.issue_pair(&subject()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(1100)).await;

        assert!(matches!(
            codec.verify_access_token(&pair.access_token).await,
            Err(AuthError::TokenExpired)
        ));
        assert_eq!(
            codec.access_token_expiry(&pair.access_token).await,
            Some(pair.access_token_expires_at)
        );
    }

    #[tokio::test]
    async fn garbage_is_invalid() {
        let codec = codec();
        assert!(matches!(
            codec
                .verify_access_token(&AccessToken("not.a.jwt".into()))
                .await,
            Err(AuthError::TokenInvalid)
        ));
        assert_eq!(
            codec
                .refresh_token_expiry(&RefreshToken("junk".into()))
                .await,
            None
        );
    }

    #[tokio::test]
    async fn hasher_accepts_only_the_right_password() {
        let hasher =
            Argon2PasswordHasher::with_params(argon2::Params::new(1024, 1, 1, None).unwrap());
        let hash = hasher.hash_password("Passw0rd!").await.unwrap();
        assert!(hasher.verify_password("Passw0rd!", &hash).await.unwrap());
        assert!(!hasher.verify_password("passw0rd!", &hash).await.unwrap());
        assert!(matches!(
            hasher.verify_password("x", "not-a-phc-string").await,
            Err(AuthError::InternalError(_))
        ));
    }
}
