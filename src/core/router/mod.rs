//! Multi-provider LLM router.
//!
//! Owns one adapter per configured vendor, selects a healthy provider
//! for each request, and walks the fallback chain on failure. Health
//! state follows the three-strikes rule; auth failures stop the chain
//! early because advancing cannot help and may burn quota.

mod status;

pub use status::{ProviderStatus, RouterStats, StatsSnapshot};

use crate::config::{CostConfig, ManagerConfig, ProviderKind, ProviderSettings, SeedforgeConfig};
use crate::core::providers::{ChatCompletion, ChunkStream, build_provider};
use crate::core::types::{
    ChatMessage, ChatResponse, CompletionOptions, ErrorKind, ProviderError, RouterError, Usage,
};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Bound on the inline health probe granted to an unhealthy primary.
const PRIMARY_PROBE_TIMEOUT: Duration = Duration::from_secs(10);

/// Routes chat completions across providers with health tracking, cost
/// accounting, and automatic fallback.
///
/// Thread-safe for concurrent `complete` calls; status mutations use
/// per-provider entries so a probe against one provider never blocks
/// calls routed to another.
pub struct LlmRouter {
    providers: DashMap<String, Arc<dyn ChatCompletion>>,
    settings: DashMap<String, ProviderSettings>,
    status: DashMap<String, ProviderStatus>,
    /// Registration order, used as the last-resort selection order
    order: RwLock<Vec<String>>,
    manager: RwLock<ManagerConfig>,
    cost: CostConfig,
    stats: RouterStats,
    last_health_check: Mutex<Option<Instant>>,
}

impl LlmRouter {
    /// Enumerate configured providers, probe each, and register the ones
    /// that pass. Falls back to single-provider mode when multi-LLM
    /// support is disabled or nothing passes.
    pub async fn initialize(config: &SeedforgeConfig) -> Self {
        let router = Self::empty(config.manager.clone(), config.cost.clone());

        if !config.feature_flags.enable_multi_llm_support {
            info!("multi-LLM support disabled, using single-provider mode");
            router.initialize_single_provider(config);
            return router;
        }

        let mut names: Vec<&String> = config.providers.keys().collect();
        names.sort();
        let mut registered = 0usize;
        for name in names {
            let settings = &config.providers[name];
            if !settings.enabled {
                debug!(provider = %name, "skipping disabled provider");
                continue;
            }
            let api_key = settings.resolve_api_key();
            if api_key.is_none() && settings.kind.requires_api_key() {
                warn!(provider = %name, "no credential available, skipping");
                continue;
            }
            let provider = match build_provider(name, settings, api_key) {
                Ok(provider) => provider,
                Err(e) => {
                    warn!(provider = %name, "failed to construct adapter: {e}");
                    continue;
                }
            };
            if provider.validate_config().await {
                router.register_provider(name, provider, settings.clone());
                registered += 1;
                info!(provider = %name, "provider registered");
            } else {
                warn!(provider = %name, "config validation failed, skipping");
            }
        }

        if registered == 0 {
            warn!("no providers passed validation, falling back to single-provider mode");
            router.initialize_single_provider(config);
        } else {
            router.compose_fallback_order();
        }
        router
    }

    /// Router over externally constructed providers, registered healthy
    /// without probing. This is the dependency-injection entry point.
    pub fn with_providers(
        entries: Vec<(String, Arc<dyn ChatCompletion>)>,
        manager: ManagerConfig,
        cost: CostConfig,
    ) -> Self {
        let router = Self::empty(manager, cost);
        for (name, provider) in entries {
            let settings = ProviderSettings::new(ProviderKind::OpenAi);
            router.register_provider(&name, provider, settings);
        }
        router.compose_fallback_order();
        router
    }

    fn empty(manager: ManagerConfig, cost: CostConfig) -> Self {
        Self {
            providers: DashMap::new(),
            settings: DashMap::new(),
            status: DashMap::new(),
            order: RwLock::new(Vec::new()),
            manager: RwLock::new(manager),
            cost,
            stats: RouterStats::default(),
            last_health_check: Mutex::new(None),
        }
    }

    fn initialize_single_provider(&self, config: &SeedforgeConfig) {
        let name = self.manager.read().default_provider.clone();
        let settings = config
            .providers
            .get(&name)
            .cloned()
            .unwrap_or_else(|| ProviderSettings::new(ProviderKind::DeepSeek));
        let api_key = settings.resolve_api_key();
        if api_key.is_none() && settings.kind.requires_api_key() {
            warn!(provider = %name, "single-provider mode has no credential; router starts empty");
            return;
        }
        match build_provider(&name, &settings, api_key) {
            Ok(provider) => {
                self.register_provider(&name, provider, settings);
                info!(provider = %name, "single-provider mode initialized");
            }
            Err(e) => warn!(provider = %name, "single-provider init failed: {e}"),
        }
    }

    /// Register a provider as healthy.
    pub fn register_provider(
        &self,
        name: &str,
        provider: Arc<dyn ChatCompletion>,
        settings: ProviderSettings,
    ) {
        if self.cost.token_usage_tracking
            && (settings.cost_per_1k.input == 0.0 || settings.cost_per_1k.output == 0.0)
        {
            warn!(provider = %name, "missing per-token cost rates, tracking this provider as free");
        }
        self.providers.insert(name.to_string(), provider);
        self.settings.insert(name.to_string(), settings);
        self.status
            .insert(name.to_string(), ProviderStatus::healthy_now());
        let mut order = self.order.write();
        if !order.iter().any(|n| n == name) {
            order.push(name.to_string());
        }
    }

    /// Append any registered healthy providers missing from the
    /// operator-configured fallback list.
    fn compose_fallback_order(&self) {
        let healthy = self.healthy_names();
        let mut manager = self.manager.write();
        let mut composed: Vec<String> = manager
            .fallback_providers
            .iter()
            .filter(|name| healthy.iter().any(|h| h == *name))
            .cloned()
            .collect();
        for name in &healthy {
            if !composed.contains(name) {
                composed.push(name.clone());
            }
        }
        debug!(order = ?composed, "fallback order composed");
        manager.fallback_providers = composed;
    }

    fn healthy_names(&self) -> Vec<String> {
        let order = self.order.read();
        order
            .iter()
            .filter(|name| {
                self.status
                    .get(name.as_str())
                    .map(|s| s.healthy)
                    .unwrap_or(false)
            })
            .cloned()
            .collect()
    }

    fn is_healthy(&self, name: &str) -> bool {
        self.status.get(name).map(|s| s.healthy).unwrap_or(false)
    }

    /// Selection policy: caller's choice, then the configured primary
    /// (or the preferred order under `"auto"`), then any healthy
    /// provider in registration order.
    fn select_provider(&self, preferred: Option<&str>) -> Option<String> {
        if let Some(name) = preferred {
            if self.providers.contains_key(name) && self.is_healthy(name) {
                return Some(name.to_string());
            }
        }

        let manager = self.manager.read();
        if manager.primary_provider == "auto" {
            for name in &manager.preferred_providers {
                if self.providers.contains_key(name) && self.is_healthy(name) {
                    return Some(name.clone());
                }
            }
        } else if self.providers.contains_key(&manager.primary_provider)
            && self.is_healthy(&manager.primary_provider)
        {
            return Some(manager.primary_provider.clone());
        }
        drop(manager);

        if let Some(name) = self.healthy_names().into_iter().next() {
            return Some(name);
        }

        // Nothing healthy: surface an explicit choice (caller's or the
        // configured primary) so the dispatch loop can probe it once.
        if let Some(name) = preferred {
            if self.providers.contains_key(name) {
                return Some(name.to_string());
            }
        }
        let manager = self.manager.read();
        if manager.primary_provider != "auto"
            && self.providers.contains_key(&manager.primary_provider)
        {
            return Some(manager.primary_provider.clone());
        }
        None
    }

    /// Ordered attempt list: the selection first, then the composed
    /// fallback order with the selection and duplicates removed.
    fn attempt_list(&self, selected: &str) -> Vec<String> {
        let mut attempts = vec![selected.to_string()];
        let manager = self.manager.read();
        if !manager.auto_fallback {
            return attempts;
        }
        for name in &manager.fallback_providers {
            if name != selected && self.providers.contains_key(name) && !attempts.contains(name) {
                attempts.push(name.clone());
            }
        }
        attempts
    }

    /// Primary operation: dispatch with automatic fallback.
    ///
    /// Never returns an error; terminal failure is reported inside the
    /// response payload.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        opts: &CompletionOptions,
    ) -> ChatResponse {
        self.stats.total_requests.fetch_add(1, Ordering::Relaxed);

        if self.providers.is_empty() {
            self.stats.failed_requests.fetch_add(1, Ordering::Relaxed);
            return ChatResponse::failure("router", ErrorKind::Unknown, "no providers available");
        }

        let Some(selected) = self.select_provider(opts.provider.as_deref()) else {
            self.stats.failed_requests.fetch_add(1, Ordering::Relaxed);
            return ChatResponse::failure(
                "router",
                ErrorKind::Unknown,
                "no healthy provider available",
            );
        };

        let attempts = self.attempt_list(&selected);
        let mut network_errors = 0usize;
        let mut auth_errors = 0usize;
        let mut last_error: Option<ProviderError> = None;

        for (index, name) in attempts.iter().enumerate() {
            let Some(provider) = self.providers.get(name).map(|p| Arc::clone(p.value())) else {
                continue;
            };

            if !self.is_healthy(name) {
                // The primary attempt earns one bounded probe; fallbacks
                // marked unhealthy are skipped outright.
                if index != 0 {
                    continue;
                }
                info!(provider = %name, "primary is unhealthy, probing before dispatch");
                let probe =
                    tokio::time::timeout(PRIMARY_PROBE_TIMEOUT, provider.validate_config()).await;
                let passed = matches!(probe, Ok(true));
                if let Some(mut status) = self.status.get_mut(name.as_str()) {
                    status.apply_probe(passed);
                }
                if !passed {
                    warn!(provider = %name, "probe failed, skipping primary");
                    continue;
                }
                info!(provider = %name, "probe passed, health restored");
            }

            if index == 0 {
                debug!(provider = %name, "dispatching to primary");
            } else {
                warn!(provider = %name, attempt = index + 1, "falling back");
            }

            let start = Instant::now();
            match provider.chat(messages, opts).await {
                Ok(response) => {
                    let latency = start.elapsed();
                    if let Some(mut status) = self.status.get_mut(name.as_str()) {
                        status.record_success(latency.as_secs_f64());
                    }
                    self.stats
                        .successful_requests
                        .fetch_add(1, Ordering::Relaxed);
                    self.stats.record_usage(name);
                    if index > 0 {
                        self.stats.fallback_count.fetch_add(1, Ordering::Relaxed);
                        info!(provider = %name, "fallback succeeded");
                    }
                    if let Some(usage) = response.usage {
                        self.track_cost(name, usage);
                    }
                    return response;
                }
                Err(err) => {
                    if let Some(mut status) = self.status.get_mut(name.as_str()) {
                        status.record_failure(err.kind);
                        if !status.healthy {
                            warn!(provider = %name, "marked unhealthy after repeated failures");
                        }
                    }
                    match err.kind {
                        ErrorKind::Network | ErrorKind::Timeout => network_errors += 1,
                        ErrorKind::Auth => auth_errors += 1,
                        _ => {}
                    }
                    warn!(provider = %name, kind = %err.kind, "attempt failed: {}", err.message);
                    let terminal = err.kind == ErrorKind::Auth;
                    last_error = Some(err);
                    if terminal {
                        // Advancing past an auth failure cannot help and
                        // may burn quota on providers sharing credentials.
                        break;
                    }
                }
            }
        }

        self.stats.failed_requests.fetch_add(1, Ordering::Relaxed);
        let mut report = format!("all {} providers failed", attempts.len());
        if network_errors > 0 {
            report.push_str(&format!("; network errors: {network_errors}"));
        }
        if auth_errors > 0 {
            report.push_str(&format!("; auth errors: {auth_errors}"));
        }
        let kind = if auth_errors > 0 {
            ErrorKind::Auth
        } else {
            last_error.as_ref().map(|e| e.kind).unwrap_or(ErrorKind::Unknown)
        };
        if let Some(err) = &last_error {
            report.push_str(&format!("; last error: {}", err.message));
        }
        ChatResponse::failure("router", kind, report)
    }

    /// Convenience wrapper building a system/user exchange.
    ///
    /// This is the only throwing surface of the router.
    pub async fn call(
        &self,
        prompt: &str,
        system: Option<&str>,
        temperature: Option<f32>,
    ) -> Result<String, RouterError> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(prompt));

        let mut opts = CompletionOptions::default();
        opts.temperature = temperature;

        let response = self.complete(&messages, &opts).await;
        if response.success {
            Ok(response.content)
        } else {
            Err(RouterError::Completion(
                response
                    .error
                    .map(|e| e.message)
                    .unwrap_or_else(|| "unknown completion failure".to_string()),
            ))
        }
    }

    /// Streaming convenience wrapper. No fallback chain: callers degrade
    /// to the blocking [`Self::call`] when the selected provider cannot
    /// stream.
    pub async fn call_stream(
        &self,
        prompt: &str,
        system: Option<&str>,
        temperature: Option<f32>,
    ) -> Result<ChunkStream, RouterError> {
        let Some(name) = self.select_provider(None) else {
            return Err(RouterError::NoProviders);
        };
        let provider = self
            .providers
            .get(&name)
            .map(|p| Arc::clone(p.value()))
            .ok_or(RouterError::NoProviders)?;
        if !provider.supports_streaming() {
            return Err(RouterError::StreamingNotSupported { provider: name });
        }

        let mut messages = Vec::with_capacity(2);
        if let Some(system) = system {
            messages.push(ChatMessage::system(system));
        }
        messages.push(ChatMessage::user(prompt));
        let mut opts = CompletionOptions::default();
        opts.temperature = temperature;

        match provider.chat_stream(&messages, &opts).await {
            Ok(stream) => Ok(stream),
            Err(err) => {
                if let Some(mut status) = self.status.get_mut(&name) {
                    status.record_failure(err.kind);
                }
                Err(RouterError::Provider(err))
            }
        }
    }

    /// Snapshot of every provider's health record.
    pub fn status(&self) -> HashMap<String, ProviderStatus> {
        self.status
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    /// Statistics snapshot.
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Probe every provider, throttled by `health_check_interval` unless
    /// `force` is set. Within the throttle window, the cached health
    /// flags are returned.
    pub async fn health_check(&self, force: bool) -> HashMap<String, bool> {
        let interval = self.manager.read().health_check_interval;
        {
            let mut last = self.last_health_check.lock();
            let throttled = !force
                && last
                    .map(|at| at.elapsed() < Duration::from_secs(interval))
                    .unwrap_or(false);
            if throttled {
                return self
                    .status
                    .iter()
                    .map(|e| (e.key().clone(), e.value().healthy))
                    .collect();
            }
            *last = Some(Instant::now());
        }

        info!("running provider health checks");
        let entries: Vec<(String, Arc<dyn ChatCompletion>)> = self
            .providers
            .iter()
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        let probes = entries.into_iter().map(|(name, provider)| async move {
            let passed = provider.validate_config().await;
            (name, passed)
        });
        let outcomes = futures::future::join_all(probes).await;

        let mut results = HashMap::with_capacity(outcomes.len());
        for (name, passed) in outcomes {
            if let Some(mut status) = self.status.get_mut(&name) {
                status.apply_probe(passed);
            }
            debug!(provider = %name, healthy = passed, "health check");
            results.insert(name, passed);
        }
        results
    }

    /// Dynamically register a last-resort provider with a default
    /// configuration and generous timeouts. Only cloud vendors with
    /// well-known endpoints qualify.
    pub async fn add_emergency_fallback(&self, kind: ProviderKind, api_key: &str) -> bool {
        if !matches!(
            kind,
            ProviderKind::OpenAi | ProviderKind::Anthropic | ProviderKind::Gemini
        ) {
            warn!(kind = kind.as_str(), "unsupported emergency fallback vendor");
            return false;
        }
        let name = kind.as_str().to_string();
        info!(provider = %name, "registering emergency fallback");

        let mut settings = ProviderSettings::new(kind).with_api_key(api_key);
        settings.connect_timeout_secs = 60;
        settings.read_timeout_secs = 300;

        let provider = match build_provider(&name, &settings, Some(api_key.to_string())) {
            Ok(provider) => provider,
            Err(e) => {
                warn!(provider = %name, "emergency fallback construction failed: {e}");
                return false;
            }
        };
        if !provider.validate_config().await {
            warn!(provider = %name, "emergency fallback failed validation");
            return false;
        }

        self.register_provider(&name, provider, settings);
        let mut manager = self.manager.write();
        if !manager.fallback_providers.contains(&name) {
            manager.fallback_providers.push(name.clone());
        }
        info!(provider = %name, "emergency fallback registered");
        true
    }

    /// Promote a provider to primary. Only succeeds while it is healthy.
    pub fn switch_primary(&self, name: &str) -> bool {
        if self.providers.contains_key(name) && self.is_healthy(name) {
            self.manager.write().primary_provider = name.to_string();
            info!(provider = %name, "primary provider switched");
            true
        } else {
            false
        }
    }

    /// Model listings, for one provider or all of them.
    pub async fn available_models(&self, provider: Option<&str>) -> HashMap<String, Vec<String>> {
        let entries: Vec<(String, Arc<dyn ChatCompletion>)> = self
            .providers
            .iter()
            .filter(|e| provider.is_none_or(|p| p == e.key().as_str()))
            .map(|e| (e.key().clone(), Arc::clone(e.value())))
            .collect();
        let mut models = HashMap::with_capacity(entries.len());
        for (name, adapter) in entries {
            models.insert(name, adapter.available_models().await);
        }
        models
    }

    fn track_cost(&self, name: &str, usage: Usage) {
        if !self.cost.token_usage_tracking {
            return;
        }
        let rates = self
            .settings
            .get(name)
            .map(|s| s.cost_per_1k)
            .unwrap_or_default();
        let cost = (usage.prompt_tokens as f64 / 1000.0) * rates.input
            + (usage.completion_tokens as f64 / 1000.0) * rates.output;
        self.stats.record_cost(name, cost);
        debug!(provider = %name, cost, "cost accumulated");
    }
}
