// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use coinscope_api::{AuthClient, MarketClient, Session};
use coinscope_app::{
    AuthMode, Candidate, CoinDetail, CoinId, CoinLookup, Liveness, LookupFailure, LookupRequest,
    MarketCoin, SessionHub, SessionListener, SessionUser, SignUpOutcome, Subscription,
};
use coinscope_tui::{AppRuntime, AuthOutcome, AuthRequest, InternalEvent};
use std::sync::mpsc::Sender;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

type SessionSlot = Arc<Mutex<Option<Session>>>;

/// Network-backed runtime: market lookups and auth submissions run on worker
/// threads.
pub struct ApiRuntime {
    market: Arc<MarketClient>,
    auth: Option<Arc<AuthClient>>,
    session: SessionSlot,
    hub: SessionHub,
    popular_limit: usize,
}

impl ApiRuntime {
    pub fn new(market: MarketClient, auth: Option<AuthClient>, popular_limit: usize) -> Self {
        Self {
            market: Arc::new(market),
            auth: auth.map(Arc::new),
            session: SessionSlot::default(),
            hub: SessionHub::new(),
            popular_limit,
        }
    }

    fn auth(&self) -> Result<&Arc<AuthClient>> {
        self.auth
            .as_ref()
            .ok_or_else(|| anyhow!("sign-in is not configured; set [auth] url and anon_key"))
    }
}

/// Signs in and publishes the new user once the tokens are stored.
fn establish_session(
    auth: &AuthClient,
    slot: &SessionSlot,
    hub: &SessionHub,
    email: &str,
    password: &str,
) -> Result<SessionUser> {
    let session = auth.sign_in(email, password)?;
    let user = session.user.clone();
    *lock(slot) = Some(session);
    hub.set_user(Some(user.clone()));
    Ok(user)
}

fn lock(slot: &SessionSlot) -> MutexGuard<'_, Option<Session>> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

impl AppRuntime for ApiRuntime {
    fn load_popular(&mut self) -> Result<Vec<MarketCoin>> {
        self.market.popular(self.popular_limit)
    }

    fn load_coin_detail(&mut self, id: &CoinId) -> Result<CoinDetail> {
        self.market.coin_detail(id)
    }

    fn lookup(&mut self, query: &str) -> Result<Vec<Candidate>, LookupFailure> {
        self.market.lookup(query)
    }

    fn spawn_lookup(
        &mut self,
        request: LookupRequest,
        liveness: Liveness,
        tx: Sender<InternalEvent>,
    ) -> Result<()> {
        let market = Arc::clone(&self.market);
        thread::Builder::new()
            .name("coin-lookup".to_owned())
            .spawn(move || {
                let outcome = market.lookup(&request.query);
                if !liveness.is_alive() {
                    tracing::trace!(token = ?request.token, "search torn down, dropping result");
                    return;
                }
                // The receiver is gone only when the UI loop has exited.
                let _ = tx.send(InternalEvent::Lookup {
                    token: request.token,
                    outcome,
                });
            })
            .context("spawn lookup worker")?;
        Ok(())
    }

    fn spawn_auth(&mut self, request: AuthRequest, tx: Sender<InternalEvent>) -> Result<()> {
        let auth = Arc::clone(self.auth()?);
        let slot = Arc::clone(&self.session);
        let hub = self.hub.clone();
        thread::Builder::new()
            .name("auth".to_owned())
            .spawn(move || {
                let outcome = match request.mode {
                    AuthMode::SignIn => AuthOutcome::SignedIn(
                        establish_session(&auth, &slot, &hub, &request.email, &request.password)
                            .map_err(|error| format!("{error:#}")),
                    ),
                    AuthMode::SignUp => AuthOutcome::Registered(
                        auth.register(&request.email, &request.password)
                            .map_err(|error| format!("{error:#}")),
                    ),
                };
                let _ = tx.send(InternalEvent::AuthFinished(outcome));
            })
            .context("spawn auth worker")?;
        Ok(())
    }

    fn auth_enabled(&self) -> bool {
        self.auth.is_some()
    }

    fn current_user(&self) -> Option<SessionUser> {
        self.hub.current_user()
    }

    fn subscribe_session(&mut self, listener: SessionListener) -> Option<Subscription> {
        Some(self.hub.subscribe(listener))
    }

    fn sign_in(&mut self, email: &str, password: &str) -> Result<SessionUser> {
        establish_session(self.auth()?, &self.session, &self.hub, email, password)
    }

    fn register(&mut self, email: &str, password: &str) -> Result<SignUpOutcome> {
        self.auth()?.register(email, password)
    }

    /// Drops the local session even when the server call fails.
    fn sign_out(&mut self) -> Result<()> {
        let session = lock(&self.session).take();
        let result = match (session, self.auth.as_ref()) {
            (Some(session), Some(auth)) => auth.sign_out(&session),
            _ => Ok(()),
        };
        self.hub.set_user(None);
        result
    }
}
