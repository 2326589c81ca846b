//! The escalation state machine.
//!
//! Tiers run cheapest first: learned selector, structured data, CSS
//! selectors, free text, dynamic render with variant resolution, then the two
//! model tiers. The first candidate that survives [`PriceValidator`] wins.
//! Every attempt, including failures, lands in the result's audit list.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use pricewatch_core::{
    normalize_domain, AppConfig, ContainerKind, CostCategory, EffectiveRules, ErrorKind,
    ExtractionRequest, ExtractionResult, ExtractionStatus, PriceCandidate, PriceMarker,
    SiteRuleSet, Tier, TierAttempt, TierOutcome, VariantResolution, DEFAULT_CURRENCY,
};
use rust_decimal::Decimal;

use crate::budget::{BudgetGuard, BudgetLimits};
use crate::candidate::select_candidate;
use crate::dom::PageDocument;
use crate::error::{ExtractError, FetchError, ModelError, RenderError};
use crate::fetch::{Capability, PageFetcher};
use crate::llm::{full_content, partial_content, LanguageModel, LlmPriceRequest};
use crate::locator::Locator;
use crate::parse::NumericPriceParser;
use crate::render_pool::{RenderLease, RenderPool};
use crate::selector_cache::SelectorCache;
use crate::store::PriceStore;
use crate::tiers::{css, learned, locate_amount, TierContext};
use crate::validate::{AcceptedPrice, PriceValidator, Validation, ValidationConfig};
use crate::variant::{self, discover_controls, VariantResolver, VariantSignature};

/// Tunables for one [`Extractor`].
#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    /// Cost ceiling passed to the rendering service per fetch.
    pub fetch_max_cost: Decimal,
    pub navigation_timeout: Duration,
    /// Upper bound on any single tier attempt.
    pub tier_timeout: Duration,
    pub lease_timeout: Duration,
    pub resolver: VariantResolver,
    pub validation: ValidationConfig,
    /// Applied to the final confidence when variant resolution failed.
    pub unresolved_variant_factor: f64,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            fetch_max_cost: Decimal::new(5, 2),
            navigation_timeout: Duration::from_secs(30),
            tier_timeout: Duration::from_secs(90),
            lease_timeout: Duration::from_secs(30),
            resolver: VariantResolver::default(),
            validation: ValidationConfig::default(),
            unresolved_variant_factor: 0.85,
        }
    }
}

impl ExtractorConfig {
    #[must_use]
    pub fn from_app_config(config: &AppConfig) -> Self {
        Self {
            fetch_max_cost: config.render_max_cost_usd,
            navigation_timeout: Duration::from_secs(config.navigation_timeout_secs),
            tier_timeout: Duration::from_secs(config.tier_timeout_secs),
            lease_timeout: Duration::from_secs(config.render_lease_timeout_secs),
            resolver: VariantResolver {
                settle_timeout: Duration::from_millis(config.settle_timeout_ms),
                ..VariantResolver::default()
            },
            ..Self::default()
        }
    }
}

/// Collaborators an [`Extractor`] is built from. No globals: every shared
/// service is passed in here.
pub struct ExtractorServices {
    pub rules: Arc<SiteRuleSet>,
    pub store: Arc<dyn PriceStore>,
    pub cache: Arc<SelectorCache>,
    pub budget: Arc<BudgetGuard>,
    pub fetcher: Arc<dyn PageFetcher>,
    pub render_pool: Option<Arc<RenderPool>>,
    pub partial_model: Option<Arc<dyn LanguageModel>>,
    pub full_model: Option<Arc<dyn LanguageModel>>,
}

impl ExtractorServices {
    /// Services sharing one store for cache, budget and audit.
    #[must_use]
    pub fn new(
        rules: Arc<SiteRuleSet>,
        store: Arc<dyn PriceStore>,
        fetcher: Arc<dyn PageFetcher>,
        limits: BudgetLimits,
    ) -> Self {
        Self {
            cache: Arc::new(SelectorCache::new(Arc::clone(&store))),
            budget: Arc::new(BudgetGuard::new(limits, Arc::clone(&store))),
            rules,
            store,
            fetcher,
            render_pool: None,
            partial_model: None,
            full_model: None,
        }
    }

    #[must_use]
    pub fn with_render_pool(mut self, pool: Arc<RenderPool>) -> Self {
        self.render_pool = Some(pool);
        self
    }

    #[must_use]
    pub fn with_models(
        mut self,
        partial: Option<Arc<dyn LanguageModel>>,
        full: Option<Arc<dyn LanguageModel>>,
    ) -> Self {
        self.partial_model = partial;
        self.full_model = full;
        self
    }
}

/// Why a tier produced nothing usable.
#[derive(Debug, Clone)]
struct TierStop {
    outcome: TierOutcome,
    detail: String,
}

impl TierStop {
    fn new(outcome: TierOutcome, detail: impl Into<String>) -> Self {
        Self {
            outcome,
            detail: detail.into(),
        }
    }

    fn from_error(err: &ExtractError) -> Self {
        Self::new(err.outcome(), err.to_string())
    }
}

impl From<ExtractError> for TierStop {
    fn from(err: ExtractError) -> Self {
        Self::from_error(&err)
    }
}

impl From<FetchError> for TierStop {
    fn from(err: FetchError) -> Self {
        Self::from_error(&err.into())
    }
}

impl From<RenderError> for TierStop {
    fn from(err: RenderError) -> Self {
        Self::from_error(&err.into())
    }
}

impl From<ModelError> for TierStop {
    fn from(err: ModelError) -> Self {
        Self::from_error(&err.into())
    }
}

/// What a tier found.
struct TierYield {
    candidates: Vec<PriceCandidate>,
    /// Upper bound the tier puts on the final confidence (model tiers).
    confidence_cap: Option<f64>,
    detail: Option<String>,
}

impl TierYield {
    fn candidates(candidates: Vec<PriceCandidate>) -> Self {
        Self {
            candidates,
            confidence_cap: None,
            detail: None,
        }
    }
}

type TierResult = Result<TierYield, TierStop>;

/// A validator rejection kept as the flagged fallback.
struct Fallback {
    candidate: PriceCandidate,
    reason: String,
    confidence: f64,
}

/// Per-request working state.
struct Run<'r> {
    request: &'r ExtractionRequest,
    domain: String,
    rules: EffectiveRules,
    variant: VariantSignature,
    attempts: Vec<TierAttempt>,
    cost: Decimal,
    static_page: Option<String>,
    static_error: Option<TierStop>,
    rendered_page: Option<String>,
    variant_resolution: Option<VariantResolution>,
    fallback: Option<Fallback>,
    costed_denied: bool,
}

impl Run<'_> {
    fn record(&mut self, tier: Tier, outcome: TierOutcome, elapsed_ms: u64, detail: Option<String>) {
        self.attempts.push(TierAttempt {
            tier,
            outcome,
            elapsed_ms,
            detail: detail.filter(|_| self.request.debug),
        });
    }

    fn context<'a>(&'a self, parser: &'a NumericPriceParser) -> TierContext<'a> {
        TierContext {
            rules: &self.rules,
            parser,
            variant: &self.variant,
        }
    }

    /// Page the model tiers read: rendered when available, static otherwise.
    fn best_page(&self) -> Option<&str> {
        self.rendered_page.as_deref().or(self.static_page.as_deref())
    }
}

/// Runs the tiered pipeline for single requests. Cheap to share behind an
/// `Arc`; all state lives in the injected services.
pub struct Extractor {
    services: ExtractorServices,
    parser: NumericPriceParser,
    validator: PriceValidator,
    config: ExtractorConfig,
}

impl Extractor {
    #[must_use]
    pub fn new(services: ExtractorServices, config: ExtractorConfig) -> Self {
        Self {
            validator: PriceValidator::new(config.validation.clone()),
            parser: NumericPriceParser::default(),
            services,
            config,
        }
    }

    #[must_use]
    pub fn store(&self) -> &Arc<dyn PriceStore> {
        &self.services.store
    }

    /// Closes the render pool's browsers, if there is a pool. Later dynamic
    /// tiers fail with a closed-pool error.
    pub async fn shutdown(&self) {
        if let Some(pool) = &self.services.render_pool {
            pool.shutdown().await;
        }
    }

    #[must_use]
    pub fn budget(&self) -> &Arc<BudgetGuard> {
        &self.services.budget
    }

    #[must_use]
    pub fn cache(&self) -> &Arc<SelectorCache> {
        &self.services.cache
    }

    /// Determines the current price for one item.
    pub async fn extract(&self, request: &ExtractionRequest) -> ExtractionResult {
        self.extract_with_deadline(request, None).await
    }

    /// Like [`Extractor::extract`], but stops escalating once `deadline`
    /// passes. The deadline is checked between tiers.
    pub async fn extract_with_deadline(
        &self,
        request: &ExtractionRequest,
        deadline: Option<Instant>,
    ) -> ExtractionResult {
        let started = Instant::now();
        let result = match self.prepare(request).await {
            Ok(run) => self.escalate(run, deadline).await,
            Err(reason) => {
                tracing::warn!(item_id = %request.item_id, url = %request.url, %reason, "rejecting extraction request");
                ExtractionResult::failed(request, ErrorKind::InvalidRequest, Vec::new())
            }
        };

        tracing::info!(
            item_id = %result.item_id,
            status = result.status.as_str(),
            tier = result.tier.map(Tier::as_str),
            price = result.price.map(|p| p.to_string()),
            confidence = result.confidence,
            elapsed_ms = elapsed_ms(started),
            "extraction finished"
        );

        if let Err(e) = self.services.store.record_audit_result(&result).await {
            tracing::warn!(item_id = %result.item_id, error = %e, "failed to record audit result");
        }
        result
    }

    async fn prepare<'r>(&self, request: &'r ExtractionRequest) -> Result<Run<'r>, String> {
        let url = reqwest::Url::parse(&request.url).map_err(|e| format!("invalid URL: {e}"))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(format!("unsupported URL {}", request.url));
        }
        if request.item_name.trim().is_empty() {
            return Err("item name is empty".to_string());
        }

        let domain = normalize_domain(&request.url);
        let stored = match self.services.store.get_site_rule(&domain).await {
            Ok(rule) => rule,
            Err(e) => {
                tracing::warn!(%domain, error = %e, "stored site rule unavailable; using file rules");
                None
            }
        };
        let rules = self.services.rules.effective(
            &domain,
            &request.item_id,
            &request.item_name,
            request.category.as_deref(),
            stored.as_ref(),
        );

        Ok(Run {
            request,
            domain,
            rules,
            variant: VariantSignature::parse(&request.item_name),
            attempts: Vec::new(),
            cost: Decimal::ZERO,
            static_page: None,
            static_error: None,
            rendered_page: None,
            variant_resolution: None,
            fallback: None,
            costed_denied: false,
        })
    }

    async fn escalate(&self, mut run: Run<'_>, deadline: Option<Instant>) -> ExtractionResult {
        let previous = run.request.usable_previous_price();
        let anchor = previous.or(run.rules.expected_price);
        let mut cancelled = false;

        for tier in Tier::ESCALATION {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                run.record(tier, TierOutcome::Cancelled, 0, Some("batch deadline passed".to_string()));
                cancelled = true;
                break;
            }

            let started = Instant::now();
            let step = match tokio::time::timeout(self.config.tier_timeout, self.run_tier(tier, &mut run)).await {
                Ok(step) => step,
                Err(_) => Err(TierStop::new(
                    TierOutcome::Timeout,
                    format!("tier exceeded {}s", self.config.tier_timeout.as_secs()),
                )),
            };
            let elapsed = elapsed_ms(started);

            let found = match step {
                Ok(found) => found,
                Err(stop) => {
                    tracing::debug!(
                        item_id = %run.request.item_id,
                        tier = tier.as_str(),
                        outcome = ?stop.outcome,
                        detail = %stop.detail,
                        elapsed_ms = elapsed,
                        "tier produced no candidate"
                    );
                    let pool_exhausted = stop.outcome == TierOutcome::PoolExhausted;
                    run.record(tier, stop.outcome, elapsed, Some(stop.detail));
                    if pool_exhausted {
                        let mut result =
                            ExtractionResult::failed(run.request, ErrorKind::PoolExhaustedTimeout, run.attempts);
                        result.cost = run.cost;
                        return result;
                    }
                    continue;
                }
            };

            let Some(chosen) = select_candidate(found.candidates, run.rules.candidate_range(), anchor) else {
                if tier == Tier::LearnedSelector {
                    tracing::warn!(item_id = %run.request.item_id, domain = %run.domain, "learned selector no longer resolves; demoted for this run");
                }
                run.record(tier, TierOutcome::NoCandidate, elapsed, found.detail);
                continue;
            };

            match self.validator.validate(chosen.amount, previous, run.rules.hard_range) {
                Validation::Accepted(accepted) => {
                    let detail = found.detail.or_else(|| Some(chosen.snippet.clone()));
                    run.record(tier, TierOutcome::Success, elapsed, detail);
                    return self.succeed(run, chosen, accepted, found.confidence_cap).await;
                }
                Validation::Rejected { reason, confidence } => {
                    if tier == Tier::LearnedSelector {
                        tracing::warn!(item_id = %run.request.item_id, domain = %run.domain, %reason, "learned selector failed validation; demoted for this run");
                    } else {
                        tracing::info!(item_id = %run.request.item_id, tier = tier.as_str(), %reason, "candidate rejected; escalating");
                    }
                    run.record(tier, TierOutcome::Rejected, elapsed, Some(reason.clone()));
                    run.fallback = Some(Fallback {
                        candidate: chosen,
                        reason,
                        confidence,
                    });
                }
            }
        }

        self.give_up(run, cancelled)
    }

    async fn run_tier(&self, tier: Tier, run: &mut Run<'_>) -> TierResult {
        match tier {
            Tier::LearnedSelector => self.learned_tier(run).await,
            Tier::StructuredData | Tier::CssSelectors | Tier::Regex => {
                let html = self.static_page(run).await?;
                let candidates = run.context(&self.parser).run(tier, &html);
                Ok(TierYield::candidates(candidates))
            }
            Tier::DynamicRender => self.dynamic_tier(run).await,
            Tier::AiPartial | Tier::AiFull => self.model_tier(tier, run).await,
        }
    }

    async fn learned_tier(&self, run: &mut Run<'_>) -> TierResult {
        let Some(entry) = self
            .services
            .cache
            .lookup(&run.domain, &run.request.item_id)
            .await
        else {
            return Err(TierStop::new(TierOutcome::NoCandidate, "no learned selector"));
        };
        let locator: Locator = entry.locator.parse()?;
        let html = self.static_page(run).await?;
        let candidate = learned::replay(&html, &locator, &run.context(&self.parser));
        Ok(TierYield {
            candidates: candidate.into_iter().collect(),
            confidence_cap: None,
            detail: Some(entry.locator),
        })
    }

    /// The static page, fetched once per request and shared by the static
    /// tiers. A blocked fetch is retried through the anti-bot capability.
    async fn static_page(&self, run: &mut Run<'_>) -> Result<String, TierStop> {
        if let Some(html) = &run.static_page {
            return Ok(html.clone());
        }
        if let Some(stop) = &run.static_error {
            return Err(stop.clone());
        }
        let fetched = if run.rules.requires_render {
            Err(TierStop::new(TierOutcome::Skipped, "site requires rendering"))
        } else {
            self.fetch_static(run).await
        };
        match fetched {
            Ok(html) => {
                run.static_page = Some(html.clone());
                Ok(html)
            }
            Err(stop) => {
                run.static_error = Some(stop.clone());
                Err(stop)
            }
        }
    }

    async fn fetch_static(&self, run: &mut Run<'_>) -> Result<String, TierStop> {
        let request = run.request;
        match self
            .services
            .fetcher
            .fetch(&request.url, Capability::Static, self.config.fetch_max_cost)
            .await
        {
            Ok(page) => {
                run.cost += page.cost;
                Ok(page.html)
            }
            Err(e) if e.is_blocked() => self.fetch_anti_bot(run, &e).await,
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_anti_bot(&self, run: &mut Run<'_>, blocked: &FetchError) -> Result<String, TierStop> {
        let request = run.request;
        if !self.services.fetcher.supports(Capability::ScriptAntiBot) {
            return Err(TierStop::new(
                TierOutcome::Transport,
                format!("{blocked}; no anti-bot capability configured"),
            ));
        }
        let decision = self.services.budget.check(CostCategory::RenderPremium).await;
        if !decision.admitted {
            return Err(TierStop::new(
                TierOutcome::BudgetDenied,
                format!("{blocked}; render_premium budget exhausted"),
            ));
        }

        tracing::info!(item_id = %request.item_id, url = %request.url, error = %blocked, "static fetch blocked; refetching with anti-bot rendering");
        let max_cost = self.config.fetch_max_cost.min(decision.remaining);
        let page = self
            .services
            .fetcher
            .fetch(&request.url, Capability::ScriptAntiBot, max_cost)
            .await?;
        self.spend(run, CostCategory::RenderPremium, page.cost, "anti-bot refetch")
            .await;
        Ok(page.html)
    }

    async fn dynamic_tier(&self, run: &mut Run<'_>) -> TierResult {
        let Some(pool) = &self.services.render_pool else {
            return Err(TierStop::new(TierOutcome::Skipped, "no render pool configured"));
        };
        let mut lease = pool.lease_with_timeout(self.config.lease_timeout).await?;
        let outcome = self.render(&mut lease, run).await;
        lease.release().await;
        outcome
    }

    async fn render(&self, lease: &mut RenderLease, run: &mut Run<'_>) -> TierResult {
        let session = lease.session()?;
        session
            .navigate(&run.request.url, self.config.navigation_timeout)
            .await?;
        let initial = session.content().await?;

        let plan = {
            let doc = PageDocument::parse(&initial);
            let controls = discover_controls(&doc);
            variant::plan(
                &run.variant,
                &controls,
                &run.rules.control_priority,
                run.rules.resolution.as_ref(),
            )
        };

        let resolution = {
            let ctx = run.context(&self.parser);
            let probe = |page: &str| {
                select_candidate(css::extract(page, &ctx), ctx.rules.candidate_range(), None)
                    .map(|c| c.amount)
            };
            self.config.resolver.execute(session, &plan, probe).await
        };
        if resolution == VariantResolution::Unresolved {
            tracing::warn!(
                item_id = %run.request.item_id,
                variant = %run.variant.variant_key(),
                "variant unresolved; reading the default price"
            );
        }

        let page = if plan.is_empty() {
            initial
        } else {
            session.content().await?
        };
        let candidates = run.context(&self.parser).run_all(Tier::DynamicRender, &page);
        run.variant_resolution = Some(resolution);
        run.rendered_page = Some(page);

        Ok(TierYield {
            candidates,
            confidence_cap: None,
            detail: Some(format!(
                "variant {} {:?}, {} actions",
                run.variant.variant_key(),
                resolution,
                plan.actions.len()
            )),
        })
    }

    async fn model_tier(&self, tier: Tier, run: &mut Run<'_>) -> TierResult {
        let (model, category) = if tier == Tier::AiPartial {
            (&self.services.partial_model, CostCategory::AiPartial)
        } else {
            (&self.services.full_model, CostCategory::AiFull)
        };
        let Some(model) = model else {
            return Err(TierStop::new(TierOutcome::Skipped, "no model configured"));
        };
        if run.costed_denied {
            return Err(TierStop::new(
                TierOutcome::Skipped,
                "budget denied an earlier costed tier",
            ));
        }
        let mut fetch_failure = None;
        if run.rendered_page.is_none() && run.static_page.is_none() {
            // The static fetch may not have been tried yet (render-only sites).
            if let Err(stop) = self.static_page(run).await {
                tracing::debug!(
                    item_id = %run.request.item_id,
                    tier = tier.as_str(),
                    detail = %stop.detail,
                    "no static page for model tier"
                );
                fetch_failure = Some(stop.detail);
            }
        }
        let Some(page) = run.best_page() else {
            let detail = fetch_failure.map_or_else(
                || "no page content".to_string(),
                |reason| format!("no page content: {reason}"),
            );
            return Err(TierStop::new(TierOutcome::Skipped, detail));
        };
        let content = if tier == Tier::AiPartial {
            partial_content(page)
        } else {
            full_content(page)
        };

        let decision = self.services.budget.check(category).await;
        let estimate = model.estimated_cost(content.chars().count());
        if !decision.admitted || estimate > decision.remaining {
            run.costed_denied = true;
            return Err(TierStop::new(
                TierOutcome::BudgetDenied,
                format!(
                    "{category} budget: spent {} of {}, estimate {estimate}",
                    decision.spent, decision.limit
                ),
            ));
        }

        let llm_request = LlmPriceRequest {
            item_name: run.request.item_name.clone(),
            url: run.request.url.clone(),
            content,
            previous_price: run.request.usable_previous_price(),
            variant_token: run.variant.primary.clone(),
        };
        let answer = model.extract_price(&llm_request).await?;
        self.spend(run, category, answer.cost, model.model_name()).await;

        let Some(amount) = answer.price else {
            return Err(TierStop::new(TierOutcome::NoCandidate, answer.rationale));
        };
        let locator = run
            .best_page()
            .and_then(|page| locate_amount(page, amount, &run.context(&self.parser)))
            .unwrap_or_else(|| Locator::Ai(tier.as_str().to_string()));

        let candidate = PriceCandidate {
            amount,
            currency: answer.currency,
            tier,
            locator: locator.to_string(),
            snippet: answer.rationale.chars().take(120).collect(),
            container: ContainerKind::Unknown,
            marker: PriceMarker::Unmarked,
        };
        Ok(TierYield {
            candidates: vec![candidate],
            confidence_cap: Some(answer.confidence),
            detail: Some(answer.rationale),
        })
    }

    async fn spend(&self, run: &mut Run<'_>, category: CostCategory, cost: Decimal, note: &str) {
        if cost <= Decimal::ZERO {
            return;
        }
        run.cost += cost;
        self.services
            .budget
            .track(category, cost, Some(&run.request.item_id), Some(note))
            .await;
    }

    async fn succeed(
        &self,
        run: Run<'_>,
        chosen: PriceCandidate,
        accepted: AcceptedPrice,
        confidence_cap: Option<f64>,
    ) -> ExtractionResult {
        let mut confidence = accepted.confidence;
        if let Some(cap) = confidence_cap {
            confidence = confidence.min(cap);
        }
        let unresolved = run.variant_resolution == Some(VariantResolution::Unresolved);
        if unresolved {
            confidence *= self.config.unresolved_variant_factor;
        }

        let trusted = matches!(
            accepted.status,
            ExtractionStatus::Verified | ExtractionStatus::AutoCorrected
        );
        if trusted && !unresolved {
            match chosen.locator.parse::<Locator>() {
                Ok(locator) => {
                    self.services
                        .cache
                        .record_success(
                            &run.domain,
                            &run.request.item_id,
                            &locator,
                            chosen.tier,
                            confidence,
                            accepted.price,
                        )
                        .await;
                }
                Err(e) => {
                    tracing::debug!(locator = %chosen.locator, error = %e, "winning locator not parseable; not cached");
                }
            }
        }

        let currency = chosen
            .currency
            .clone()
            .or_else(|| run.request.previous_currency.clone())
            .unwrap_or_else(|| DEFAULT_CURRENCY.to_string());

        ExtractionResult {
            item_id: run.request.item_id.clone(),
            url: run.request.url.clone(),
            price: Some(accepted.price),
            raw_price: Some(chosen.amount),
            currency: Some(currency),
            tier: Some(chosen.tier),
            method: Some(format!("{}:{}", chosen.tier.as_str(), chosen.locator)),
            locator: Some(chosen.locator),
            confidence,
            status: accepted.status,
            review_reason: accepted.reason,
            attempts: run.attempts,
            error: None,
            variant_resolution: run.variant_resolution,
            cost: run.cost,
            checked_at: Utc::now(),
        }
    }

    /// Every tier is exhausted: return the last rejection flagged for review,
    /// or a failure.
    fn give_up(&self, run: Run<'_>, cancelled: bool) -> ExtractionResult {
        let Some(fallback) = run.fallback else {
            let kind = if cancelled {
                ErrorKind::Cancelled
            } else {
                ErrorKind::NoPriceFound
            };
            let mut result = ExtractionResult::failed(run.request, kind, run.attempts);
            result.cost = run.cost;
            result.variant_resolution = run.variant_resolution;
            return result;
        };

        let mut confidence = fallback.confidence;
        if run.variant_resolution == Some(VariantResolution::Unresolved) {
            confidence *= self.config.unresolved_variant_factor;
        }
        let candidate = fallback.candidate;
        ExtractionResult {
            item_id: run.request.item_id.clone(),
            url: run.request.url.clone(),
            price: None,
            raw_price: Some(candidate.amount),
            currency: candidate
                .currency
                .or_else(|| run.request.previous_currency.clone()),
            tier: Some(candidate.tier),
            method: Some(format!("{}:{}", candidate.tier.as_str(), candidate.locator)),
            locator: Some(candidate.locator),
            confidence,
            status: ExtractionStatus::NeedsReview,
            review_reason: Some(fallback.reason),
            attempts: run.attempts,
            error: None,
            variant_resolution: run.variant_resolution,
            cost: run.cost,
            checked_at: Utc::now(),
        }
    }
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
#[path = "orchestrator_test.rs"]
mod tests;
