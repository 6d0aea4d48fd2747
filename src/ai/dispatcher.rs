use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::Config;
use crate::error::{AppError, Result};
use crate::models::GenerationMethod;

use super::{
    ClaudeProvider, GeminiProvider, GenerationRequest, GenerationStrategy, TemplateGenerator,
    TemplateStrategy,
};

#[derive(Debug, Clone)]
pub struct GenerationOutcome {
    pub content: String,
    pub method: GenerationMethod,
    pub model: String,
    /// End to end, across every tier that was tried.
    pub elapsed: Duration,
}

#[derive(Debug, Clone, Serialize)]
pub struct TierStatus {
    pub method: GenerationMethod,
    pub model: String,
    pub available: bool,
}

/// Tries each tier in order until one produces a story.
pub struct Dispatcher {
    tiers: Vec<Box<dyn GenerationStrategy>>,
    tier_timeout: Duration,
}

impl Dispatcher {
    pub fn new(tiers: Vec<Box<dyn GenerationStrategy>>, tier_timeout: Duration) -> Self {
        Self {
            tiers,
            tier_timeout,
        }
    }

    /// Gemini, then Claude, then the template generator.
    pub fn from_config(config: &Config) -> Result<Self> {
        let timeout = config.provider_timeout();
        let tiers: Vec<Box<dyn GenerationStrategy>> = vec![
            Box::new(GeminiProvider::new(
                config.gemini_api_key.clone(),
                config.gemini_model.clone(),
                config.gemini_endpoint.clone(),
                timeout,
            )?),
            Box::new(ClaudeProvider::new(
                config.claude_api_key.clone(),
                config.claude_model.clone(),
                timeout,
            )?),
            Box::new(TemplateStrategy::new(TemplateGenerator::new(
                config.template_seed,
            ))),
        ];
        Ok(Self::new(tiers, timeout))
    }

    pub async fn generate(&self, request: &GenerationRequest) -> Result<GenerationOutcome> {
        self.run(request, |_| true).await
    }

    /// Skips the AI tiers entirely.
    pub async fn generate_template_only(
        &self,
        request: &GenerationRequest,
    ) -> Result<GenerationOutcome> {
        self.run(request, |tier| tier.method() == GenerationMethod::Template)
            .await
    }

    pub fn status(&self) -> Vec<TierStatus> {
        self.tiers
            .iter()
            .map(|tier| TierStatus {
                method: tier.method(),
                model: tier.model().to_string(),
                available: tier.is_available(),
            })
            .collect()
    }

    async fn run<F>(&self, request: &GenerationRequest, eligible: F) -> Result<GenerationOutcome>
    where
        F: Fn(&dyn GenerationStrategy) -> bool,
    {
        let start = Instant::now();

        for tier in self.tiers.iter().filter(|t| eligible(t.as_ref())) {
            let method = tier.method();
            if !tier.is_available() {
                tracing::debug!("Skipping {} tier: not available", method);
                continue;
            }

            let result = match tokio::time::timeout(self.tier_timeout, tier.attempt(request)).await
            {
                Ok(result) => result,
                Err(_) => Err(AppError::Provider(format!(
                    "timed out after {:?}",
                    self.tier_timeout
                ))),
            };

            match result {
                Ok(content) if !content.trim().is_empty() => {
                    let elapsed = start.elapsed();
                    tracing::info!(
                        "Story generated by {} tier ({}) in {:.2}s",
                        method,
                        tier.model(),
                        elapsed.as_secs_f64()
                    );
                    return Ok(GenerationOutcome {
                        content,
                        method,
                        model: tier.model().to_string(),
                        elapsed,
                    });
                }
                Ok(_) => {
                    tracing::warn!("{} tier returned empty content, falling back", method);
                }
                Err(e) => {
                    tracing::warn!("{} tier failed, falling back: {}", method, e);
                }
            }
        }

        Err(AppError::Provider(
            "every generation tier failed".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    enum Behaviour {
        Succeed(&'static str),
        Fail,
        Empty,
        Hang,
        Unavailable,
    }

    struct FakeTier {
        method: GenerationMethod,
        behaviour: Behaviour,
        calls: Arc<AtomicUsize>,
    }

    impl FakeTier {
        fn boxed(
            method: GenerationMethod,
            behaviour: Behaviour,
        ) -> (Box<dyn GenerationStrategy>, Arc<AtomicUsize>) {
            let calls = Arc::new(AtomicUsize::new(0));
            let tier = FakeTier {
                method,
                behaviour,
                calls: calls.clone(),
            };
            (Box::new(tier), calls)
        }
    }

    #[async_trait]
    impl GenerationStrategy for FakeTier {
        fn method(&self) -> GenerationMethod {
            self.method
        }

        fn model(&self) -> &str {
            "fake"
        }

        fn is_available(&self) -> bool {
            !matches!(self.behaviour, Behaviour::Unavailable)
        }

        async fn attempt(&self, _request: &GenerationRequest) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.behaviour {
                Behaviour::Succeed(text) => Ok(text.to_string()),
                Behaviour::Fail => Err(AppError::Provider("boom".to_string())),
                Behaviour::Empty => Ok("   ".to_string()),
                Behaviour::Hang => {
                    tokio::time::sleep(Duration::from_secs(60)).await;
                    Ok("too late".to_string())
                }
                Behaviour::Unavailable => unreachable!("unavailable tiers are never attempted"),
            }
        }
    }

    fn template_tier() -> Box<dyn GenerationStrategy> {
        Box::new(TemplateStrategy::new(TemplateGenerator::new(Some(5))))
    }

    fn request() -> GenerationRequest {
        GenerationRequest::parse("dragon, castle", "fantasy", "short", "happy").unwrap()
    }

    #[tokio::test]
    async fn primary_success_stops_the_chain() {
        let (primary, _) = FakeTier::boxed(GenerationMethod::AiPrimary, Behaviour::Succeed("A"));
        let (secondary, secondary_calls) =
            FakeTier::boxed(GenerationMethod::AiSecondary, Behaviour::Succeed("B"));
        let dispatcher = Dispatcher::new(
            vec![primary, secondary, template_tier()],
            Duration::from_secs(1),
        );

        let outcome = dispatcher.generate(&request()).await.unwrap();

        assert_eq!(outcome.content, "A");
        assert_eq!(outcome.method, GenerationMethod::AiPrimary);
        assert_eq!(secondary_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn primary_failure_falls_to_secondary() {
        let (primary, _) = FakeTier::boxed(GenerationMethod::AiPrimary, Behaviour::Fail);
        let (secondary, _) =
            FakeTier::boxed(GenerationMethod::AiSecondary, Behaviour::Succeed("B"));
        let dispatcher = Dispatcher::new(
            vec![primary, secondary, template_tier()],
            Duration::from_secs(1),
        );

        let outcome = dispatcher.generate(&request()).await.unwrap();

        assert_eq!(outcome.content, "B");
        assert_eq!(outcome.method, GenerationMethod::AiSecondary);
    }

    #[tokio::test]
    async fn both_providers_failing_yields_template() {
        let (primary, _) = FakeTier::boxed(GenerationMethod::AiPrimary, Behaviour::Fail);
        let (secondary, _) = FakeTier::boxed(GenerationMethod::AiSecondary, Behaviour::Empty);
        let dispatcher = Dispatcher::new(
            vec![primary, secondary, template_tier()],
            Duration::from_secs(1),
        );

        let outcome = dispatcher.generate(&request()).await.unwrap();

        assert_eq!(outcome.method, GenerationMethod::Template);
        assert!(!outcome.content.is_empty());
        assert!(outcome.content.contains("dragon"));
    }

    #[tokio::test]
    async fn hanging_tier_is_cut_off_by_timeout() {
        let (primary, _) = FakeTier::boxed(GenerationMethod::AiPrimary, Behaviour::Hang);
        let dispatcher =
            Dispatcher::new(vec![primary, template_tier()], Duration::from_millis(50));

        let outcome = dispatcher.generate(&request()).await.unwrap();

        assert_eq!(outcome.method, GenerationMethod::Template);
    }

    #[tokio::test]
    async fn unavailable_tiers_are_skipped() {
        let (primary, calls) =
            FakeTier::boxed(GenerationMethod::AiPrimary, Behaviour::Unavailable);
        let dispatcher = Dispatcher::new(vec![primary, template_tier()], Duration::from_secs(1));

        let outcome = dispatcher.generate(&request()).await.unwrap();

        assert_eq!(outcome.method, GenerationMethod::Template);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn template_only_bypasses_providers() {
        let (primary, calls) =
            FakeTier::boxed(GenerationMethod::AiPrimary, Behaviour::Succeed("A"));
        let dispatcher = Dispatcher::new(vec![primary, template_tier()], Duration::from_secs(1));

        let outcome = dispatcher.generate_template_only(&request()).await.unwrap();

        assert_eq!(outcome.method, GenerationMethod::Template);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn no_surviving_tier_is_a_provider_error() {
        let (primary, _) = FakeTier::boxed(GenerationMethod::AiPrimary, Behaviour::Fail);
        let dispatcher = Dispatcher::new(vec![primary], Duration::from_secs(1));

        assert!(matches!(
            dispatcher.generate(&request()).await,
            Err(AppError::Provider(_))
        ));
    }

    #[test]
    fn config_without_keys_reports_only_template_available() {
        let config = Config {
            gemini_api_key: None,
            claude_api_key: None,
            ..Config::default()
        };
        let status = Dispatcher::from_config(&config).unwrap().status();

        assert_eq!(status.len(), 3);
        assert!(!status[0].available);
        assert!(!status[1].available);
        assert!(status[2].available);
        assert_eq!(status[2].method, GenerationMethod::Template);
    }
}
