use mediavault::application_impl::*;
use mediavault::application_port::*;
use mediavault::domain_model::*;
use mediavault::domain_port::*;
use mediavault::infra_memory::*;
use std::sync::Arc;
use std::time::Duration;

struct Harness {
    auth: Arc<RealAuthService>,
    users: MemoryUserRepo,
    ledger: TokenLedger,
}

fn fast_hasher() -> Arc<dyn CredentialHasher> {
    let params = argon2::Params::new(1024, 1, 1, None).unwrap();
    Arc::new(Argon2PasswordHasher::with_params(params))
}

fn codec() -> Arc<dyn TokenCodec> {
    Arc::new(JwtHs256Codec::new(JwtConfig {
        issuer: "mediavault".into(),
        audience: "mediavault-clients".into(),
        access_ttl: Duration::from_secs(900),
        refresh_ttl: Duration::from_secs(3600),
        access_secret: b"access-secret-for-tests".to_vec(),
        refresh_secret: b"refresh-secret-for-tests".to_vec(),
    }))
}

fn harness_on(kv: Arc<dyn KvStore>) -> Harness {
    let users = MemoryUserRepo::new();
    let ledger = TokenLedger::new(kv, "test");
    let auth = Arc::new(RealAuthService::new(
        Arc::new(users.clone()),
        fast_hasher(),
        codec(),
        ledger.clone(),
    ));
    Harness {
        auth,
        users,
        ledger,
    }
}

fn harness() -> Harness {
    harness_on(Arc::new(MemoryKvStore::new()))
}

fn registration(email: &str) -> RegisterInput {
    RegisterInput {
        email: email.into(),
        password: "Passw0rd!".into(),
        first_name: "Ada".into(),
        last_name: "Lovelace".into(),
    }
}

fn credentials(email: &str, password: &str) -> LoginInput {
    LoginInput {
        email: email.into(),
        password: password.into(),
    }
}

#[tokio::test]
async fn issued_access_token_validates_until_revoked() {
    let h = harness();
    let session = h.auth.register(registration("ada@example.com")).await.unwrap();
    let user_id = session.user.user_id;
    let access = &session.tokens.access_token;

    assert!(h.auth.validate_access(user_id, access).await.unwrap());
    let principal = h.auth.authenticate(access.as_str()).await.unwrap();
    assert_eq!(principal.user_id(), user_id);
    assert_eq!(principal.subject.email, "ada@example.com");

    h.ledger.revoke_access(user_id, access.as_str()).await.unwrap();
    assert!(!h.auth.validate_access(user_id, access).await.unwrap());
    assert!(matches!(
        h.auth.authenticate(access.as_str()).await,
        Err(AuthError::TokenRevoked)
    ));
}

#[tokio::test]
async fn access_token_of_another_user_does_not_validate() {
    let h = harness();
    let a = h.auth.register(registration("a@example.com")).await.unwrap();
    let b = h.auth.register(registration("b@example.com")).await.unwrap();
    assert!(
        !h.auth
            .validate_access(b.user.user_id, &a.tokens.access_token)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn login_errors_do_not_say_which_check_failed() {
    let h = harness();
    let session = h.auth.register(registration("ada@example.com")).await.unwrap();

    let wrong_password = h
        .auth
        .login(credentials("ada@example.com", "Wrong-passw0rd"))
        .await;
    let unknown_user = h
        .auth
        .login(credentials("nobody@example.com", "Passw0rd!"))
        .await;
    assert!(matches!(wrong_password, Err(AuthError::InvalidCredentials)));
    assert!(matches!(unknown_user, Err(AuthError::InvalidCredentials)));

    h.users.set_active(session.user.user_id, false);
    assert!(matches!(
        h.auth.login(credentials("ada@example.com", "Passw0rd!")).await,
        Err(AuthError::InvalidCredentials)
    ));

    h.users.set_active(session.user.user_id, true);
    let again = h
        .auth
        .login(credentials("ada@example.com", "Passw0rd!"))
        .await
        .unwrap();
    assert!(again.user.last_login.is_some());
}

#[tokio::test]
async fn email_is_unique_regardless_of_case() {
    let h = harness();
    h.auth.register(registration("ada@example.com")).await.unwrap();
    assert!(matches!(
        h.auth.register(registration("ADA@Example.com")).await,
        Err(AuthError::EmailTaken)
    ));
}

#[tokio::test]
async fn refresh_rotates_the_pair() {
    let h = harness();
    let first = h.auth.register(registration("ada@example.com")).await.unwrap();

    let second = h.auth.refresh(&first.tokens.refresh_token).await.unwrap();
    assert_ne!(second.tokens.refresh_token, first.tokens.refresh_token);
    assert!(
        h.auth
            .validate_access(second.user.user_id, &second.tokens.access_token)
            .await
            .unwrap()
    );

    // the old refresh token is spent
    assert!(matches!(
        h.auth.refresh(&first.tokens.refresh_token).await,
        Err(AuthError::TokenRevoked)
    ));
    assert!(h.auth.refresh(&second.tokens.refresh_token).await.is_ok());
}

#[tokio::test]
async fn concurrent_refresh_has_exactly_one_winner() {
    let h = harness();
    let session = h.auth.register(registration("ada@example.com")).await.unwrap();
    let token = session.tokens.refresh_token.clone();

    let mut tasks = Vec::new();
    for _ in 0..8 {
        let auth = h.auth.clone();
        let token = token.clone();
        tasks.push(tokio::spawn(async move { auth.refresh(&token).await }));
    }

    let mut wins = 0;
    let mut losses = 0;
    for task in tasks {
        match task.await.unwrap() {
            Ok(_) => wins += 1,
            Err(AuthError::TokenRevoked) | Err(AuthError::TokenInvalid) => losses += 1,
            Err(other) => panic!("unexpected error: {other:?}"),
        }
    }
    assert_eq!(wins, 1);
    assert_eq!(losses, 7);
}

#[tokio::test]
async fn blacklist_wins_over_a_reinserted_access_entry() {
    let h = harness();
    let session = h.auth.register(registration("ada@example.com")).await.unwrap();
    let user_id = session.user.user_id;
    let access = session.tokens.access_token.clone();

    h.auth.logout(user_id, &access, None).await.unwrap();
    assert!(!h.auth.validate_access(user_id, &access).await.unwrap());

    h.ledger
        .record_access_issued(user_id, access.as_str(), 900)
        .await
        .unwrap();
    assert!(h.ledger.is_access_valid(user_id, access.as_str()).await.unwrap());
    assert!(!h.auth.validate_access(user_id, &access).await.unwrap());
}

#[tokio::test]
async fn logout_is_idempotent_and_kills_the_refresh_token() {
    let h = harness();
    let session = h.auth.register(registration("ada@example.com")).await.unwrap();
    let user_id = session.user.user_id;
    let tokens = &session.tokens;

    h.auth
        .logout(user_id, &tokens.access_token, Some(&tokens.refresh_token))
        .await
        .unwrap();
    h.auth
        .logout(user_id, &tokens.access_token, Some(&tokens.refresh_token))
        .await
        .unwrap();

    assert!(h.auth.refresh(&tokens.refresh_token).await.is_err());
    let creds = h.users.find_credentials_by_id(user_id).await.unwrap().unwrap();
    assert!(creds.refresh_tokens.is_empty());
}

#[tokio::test]
async fn logout_leaves_someone_elses_refresh_token_alone() {
    let h = harness();
    let a = h.auth.register(registration("a@example.com")).await.unwrap();
    let b = h.auth.register(registration("b@example.com")).await.unwrap();

    h.auth
        .logout(
            a.user.user_id,
            &a.tokens.access_token,
            Some(&b.tokens.refresh_token),
        )
        .await
        .unwrap();
    assert!(h.auth.refresh(&b.tokens.refresh_token).await.is_ok());
}

#[tokio::test]
async fn logout_all_devices_revokes_every_session() {
    let h = harness();
    let first = h.auth.register(registration("ada@example.com")).await.unwrap();
    let second = h
        .auth
        .login(credentials("ada@example.com", "Passw0rd!"))
        .await
        .unwrap();
    let user_id = first.user.user_id;

    h.auth.logout_all_devices(user_id).await.unwrap();

    for session in [&first, &second] {
        assert!(
            !h.auth
                .validate_access(user_id, &session.tokens.access_token)
                .await
                .unwrap()
        );
        assert!(matches!(
            h.auth.refresh(&session.tokens.refresh_token).await,
            Err(AuthError::TokenRevoked)
        ));
    }

    // a fresh login works again
    let third = h
        .auth
        .login(credentials("ada@example.com", "Passw0rd!"))
        .await
        .unwrap();
    assert!(
        h.auth
            .validate_access(user_id, &third.tokens.access_token)
            .await
            .unwrap()
    );
}

#[tokio::test]
async fn inactive_accounts_cannot_refresh() {
    let h = harness();
    let session = h.auth.register(registration("ada@example.com")).await.unwrap();
    h.users.set_active(session.user.user_id, false);
    assert!(matches!(
        h.auth.refresh(&session.tokens.refresh_token).await,
        Err(AuthError::TokenRevoked)
    ));
}

#[tokio::test]
async fn refresh_needs_the_durable_list_to_agree() {
    let h = harness();
    let session = h.auth.register(registration("ada@example.com")).await.unwrap();
    let user_id = session.user.user_id;

    h.users
        .update_refresh_tokens(user_id, RefreshTokenChange::Clear)
        .await
        .unwrap();
    assert!(matches!(
        h.auth.refresh(&session.tokens.refresh_token).await,
        Err(AuthError::TokenRevoked)
    ));
}

#[tokio::test]
async fn access_tokens_are_not_refresh_tokens() {
    let h = harness();
    let session = h.auth.register(registration("ada@example.com")).await.unwrap();
    let as_refresh = RefreshToken(session.tokens.access_token.0.clone());
    assert!(matches!(
        h.auth.refresh(&as_refresh).await,
        Err(AuthError::TokenInvalid)
    ));
    assert!(matches!(
        h.auth.authenticate(session.tokens.refresh_token.as_str()).await,
        Err(AuthError::TokenInvalid)
    ));
}

struct DownKv;

#[async_trait::async_trait]
impl KvStore for DownKv {
    async fn get(&self, _: &str) -> Result<Option<String>, KvError> {
        Err(KvError::Unavailable("connection refused".into()))
    }
    async fn set_ex(&self, _: &str, _: &str, _: u64) -> Result<(), KvError> {
        Err(KvError::Unavailable("connection refused".into()))
    }
    async fn del(&self, _: &str) -> Result<bool, KvError> {
        Err(KvError::Unavailable("connection refused".into()))
    }
    async fn exists(&self, _: &str) -> Result<bool, KvError> {
        Err(KvError::Unavailable("connection refused".into()))
    }
    async fn take(&self, _: &str) -> Result<Option<String>, KvError> {
        Err(KvError::Unavailable("connection refused".into()))
    }
    async fn set_add(&self, _: &str, _: &str) -> Result<(), KvError> {
        Err(KvError::Unavailable("connection refused".into()))
    }
    async fn set_remove(&self, _: &str, _: &str) -> Result<(), KvError> {
        Err(KvError::Unavailable("connection refused".into()))
    }
    async fn set_members(&self, _: &str) -> Result<Vec<String>, KvError> {
        Err(KvError::Unavailable("connection refused".into()))
    }
    async fn ping(&self) -> Result<(), KvError> {
        Err(KvError::Unavailable("connection refused".into()))
    }
}

#[tokio::test]
async fn ledger_outage_surfaces_as_unavailable() {
    let h = harness_on(Arc::new(DownKv));
    assert!(matches!(
        h.auth.register(registration("ada@example.com")).await,
        Err(AuthError::Unavailable(_))
    ));
    assert!(h.ledger.ping().await.is_err());
}
