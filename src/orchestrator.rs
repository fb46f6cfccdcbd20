//! Fan-out/fan-in translation of one request.
//!
//! Every work item runs its own pipeline of engine steps (detect, model
//! preparation, translate) on the tokio runtime. A single lock guards the
//! output, the detections, the remaining-step counter and the finalized flag,
//! so the decrement that reaches zero also sees every write before it.
//! Finalization happens exactly once: on the last successful step, or on the
//! first failure. Pipelines still in flight after that are not cancelled, but
//! their completions are ignored.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;
use tracing::{Instrument, debug, info, info_span, warn};
use uuid::Uuid;

use crate::assemble::{self, TranslationResponse};
use crate::engine::{DownloadPolicy, EngineAdapter};
use crate::error::{HonyakuError, Result};
use crate::language::{self, LanguagePair, LanguageTag, SourceLanguage};
use crate::request::TranslationPlan;
use crate::shape::{ListOrdering, OutputAccumulator, WorkItem};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Counting,
    Dispatching,
    Draining,
    Finalized(Completion),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Completion {
    Success,
    Failure,
}

/// Number of asynchronous steps a request implies.
///
/// A fixed source shares one model preparation across all items and then
/// translates each item. Auto-detection runs detect, prepare and translate
/// per item; preparation is counted per item even though the engine handle
/// behind it is shared by every item of the same pair.
pub fn planned_steps(source: &SourceLanguage, items: usize) -> i64 {
    if items == 0 {
        return 0;
    }
    let items = items as i64;
    match source {
        SourceLanguage::Fixed(_) => 1 + items,
        SourceLanguage::Auto => 3 * items,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StepStats {
    pub planned: i64,
    pub completed: i64,
}

#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub response: TranslationResponse,
    pub steps: StepStats,
}

enum StepOutput {
    Prepared,
    Detected { key: String, language: LanguageTag },
    Translated { item: WorkItem, language: LanguageTag, text: String },
}

struct Finished {
    output: OutputAccumulator,
    detected: BTreeMap<String, LanguageTag>,
    steps: StepStats,
}

type Settlement = (Option<oneshot::Sender<Result<Finished>>>, Result<Finished>);

struct Progress {
    phase: Phase,
    remaining: i64,
    steps: StepStats,
    output: OutputAccumulator,
    detected: BTreeMap<String, LanguageTag>,
    done: Option<oneshot::Sender<Result<Finished>>>,
}

impl Progress {
    fn is_finalized(&self) -> bool {
        matches!(self.phase, Phase::Finalized(_))
    }

    fn finish(&mut self) -> Finished {
        Finished {
            output: std::mem::replace(&mut self.output, OutputAccumulator::Text(String::new())),
            detected: std::mem::take(&mut self.detected),
            steps: self.steps,
        }
    }
}

struct Shared {
    progress: Mutex<Progress>,
    adapter: Arc<EngineAdapter>,
    target: LanguageTag,
    fallback: LanguageTag,
    policy: DownloadPolicy,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_finalized(&self) -> bool {
        self.lock().is_finalized()
    }

    fn enter(&self, phase: Phase) {
        let mut progress = self.lock();
        if !progress.is_finalized() {
            debug!("Phase {:?} -> {:?}", progress.phase, phase);
            progress.phase = phase;
        }
    }

    /// Record a successful step. The step that takes the counter to zero
    /// finalizes the request.
    fn complete_step(&self, output: StepOutput) {
        let settlement: Option<Settlement> = {
            let mut progress = self.lock();
            if progress.is_finalized() {
                debug!("Ignoring step completion after finalization");
                return;
            }

            match output {
                StepOutput::Prepared => {}
                StepOutput::Detected { key, language } => {
                    progress.detected.insert(key, language);
                }
                StepOutput::Translated { item, language, text } => {
                    progress.output.write(&item, text);
                    progress.detected.insert(item.key, language);
                }
            }

            progress.remaining -= 1;
            progress.steps.completed += 1;

            if progress.remaining == 0 {
                progress.phase = Phase::Finalized(Completion::Success);
                let finished = progress.finish();
                Some((progress.done.take(), Ok(finished)))
            } else if progress.remaining < 0 {
                progress.phase = Phase::Finalized(Completion::Failure);
                let remaining = progress.remaining;
                Some((
                    progress.done.take(),
                    Err(HonyakuError::InternalError(format!(
                        "Task count went negative: {}",
                        remaining
                    ))),
                ))
            } else {
                None
            }
        };

        if let Some((done, result)) = settlement {
            self.settle(done, result);
        }
    }

    /// Fail the request with the first error; later failures are dropped.
    fn fail(&self, err: HonyakuError) {
        let done = {
            let mut progress = self.lock();
            if progress.is_finalized() {
                debug!("Ignoring failure after finalization: {}", err);
                return;
            }
            progress.phase = Phase::Finalized(Completion::Failure);
            progress.done.take()
        };
        warn!("Translation task failed: {}", err);
        self.settle(done, Err(err));
    }

    fn settle(&self, done: Option<oneshot::Sender<Result<Finished>>>, result: Result<Finished>) {
        self.adapter.release();
        if let Some(done) = done {
            if done.send(result).is_err() {
                debug!("Task result dropped: caller went away");
            }
        }
    }
}

/// Drives one request from plan to response.
pub struct FanOutOrchestrator {
    adapter: Arc<EngineAdapter>,
    fallback: LanguageTag,
    ordering: ListOrdering,
}

impl FanOutOrchestrator {
    pub fn new(adapter: Arc<EngineAdapter>, fallback: LanguageTag, ordering: ListOrdering) -> Self {
        Self {
            adapter,
            fallback,
            ordering,
        }
    }

    pub async fn run(&self, plan: TranslationPlan) -> Result<TaskOutcome> {
        let request_id = Uuid::new_v4();
        let span = info_span!("translate_task", %request_id, engine = self.adapter.engine_name());
        self.run_planned(plan).instrument(span).await
    }

    async fn run_planned(&self, plan: TranslationPlan) -> Result<TaskOutcome> {
        let TranslationPlan {
            shape,
            items,
            target,
            target_code,
            source,
            policy,
        } = plan;

        let planned = planned_steps(&source, items.len());
        info!(
            "Translating {} item(s) to {} ({} steps, source {})",
            items.len(),
            target,
            planned,
            source.fixed().map(|t| t.code()).unwrap_or(language::AUTO_DETECT)
        );

        let output = OutputAccumulator::empty_for(&shape);
        if items.is_empty() {
            self.adapter.release();
            let response = assemble::assemble(output, BTreeMap::new(), &source, &target_code, self.ordering);
            return Ok(TaskOutcome {
                response,
                steps: StepStats { planned: 0, completed: 0 },
            });
        }

        let (done_tx, done_rx) = oneshot::channel();
        let shared = Arc::new(Shared {
            progress: Mutex::new(Progress {
                phase: Phase::Init,
                remaining: planned,
                steps: StepStats { planned, completed: 0 },
                output,
                detected: BTreeMap::new(),
                done: Some(done_tx),
            }),
            adapter: Arc::clone(&self.adapter),
            target,
            fallback: self.fallback,
            policy,
        });

        shared.enter(Phase::Counting);
        shared.enter(Phase::Dispatching);
        match source {
            SourceLanguage::Fixed(fixed) => {
                let shared = Arc::clone(&shared);
                tokio::spawn(fixed_source(shared, fixed, items).in_current_span());
            }
            SourceLanguage::Auto => {
                for item in items {
                    let shared = Arc::clone(&shared);
                    tokio::spawn(detected_source(shared, item).in_current_span());
                }
            }
        }
        shared.enter(Phase::Draining);
        drop(shared);

        let finished = match done_rx.await {
            Ok(result) => result?,
            Err(_) => {
                self.adapter.release();
                return Err(HonyakuError::InternalError(
                    "Translation task ended without a result".to_string(),
                ));
            }
        };

        debug!(
            "Finished after {}/{} steps",
            finished.steps.completed, finished.steps.planned
        );
        let response = assemble::assemble(
            finished.output,
            finished.detected,
            &source,
            &target_code,
            self.ordering,
        );
        Ok(TaskOutcome {
            response,
            steps: finished.steps,
        })
    }
}

/// Prepare the one shared model, then translate every item concurrently.
async fn fixed_source(shared: Arc<Shared>, source: LanguageTag, items: Vec<WorkItem>) {
    let pair = LanguagePair::new(source, shared.target);
    if let Err(e) = shared.adapter.ensure_model_ready(pair, &shared.policy).await {
        return shared.fail(e);
    }
    shared.complete_step(StepOutput::Prepared);

    for item in items {
        if shared.is_finalized() {
            return;
        }
        let shared = Arc::clone(&shared);
        tokio::spawn(translate_item(shared, item, pair).in_current_span());
    }
}

/// Detect, prepare the detected pair, translate.
async fn detected_source(shared: Arc<Shared>, item: WorkItem) {
    let raw = match shared.adapter.detect_language(&item.text).await {
        Ok(raw) => raw,
        Err(e) => return shared.fail(e),
    };
    let source = language::normalize_detected(&raw, shared.fallback);
    shared.complete_step(StepOutput::Detected {
        key: item.key.clone(),
        language: source,
    });
    if shared.is_finalized() {
        return;
    }

    let pair = LanguagePair::new(source, shared.target);
    if let Err(e) = shared.adapter.ensure_model_ready(pair, &shared.policy).await {
        return shared.fail(e);
    }
    shared.complete_step(StepOutput::Prepared);
    if shared.is_finalized() {
        return;
    }

    translate_item(shared, item, pair).await
}

async fn translate_item(shared: Arc<Shared>, item: WorkItem, pair: LanguagePair) {
    match shared.adapter.translate(&item.text, pair).await {
        Ok(text) => shared.complete_step(StepOutput::Translated {
            item,
            language: pair.source,
            text,
        }),
        Err(e) => shared.fail(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::{Calls, FakeEngine};
    use crate::engine::{MockTranslationEngine, TranslationEngine};
    use crate::request::TranslationRequest;
    use crate::shape::{KeyedTexts, TranslatedTexts};
    use serde_json::{Value, json};
    use tokio_test::{assert_err, assert_ok};

    fn tag(code: &str) -> LanguageTag {
        LanguageTag::parse(code).unwrap()
    }

    fn plan(input: Value, target: &str, source: Option<&str>) -> TranslationPlan {
        let mut request = TranslationRequest::new(input, target);
        request.source_lang_code = source.map(str::to_string);
        request.into_plan(DownloadPolicy::default()).unwrap()
    }

    async fn run_with(
        engine: Arc<dyn TranslationEngine>,
        plan: TranslationPlan,
        ordering: ListOrdering,
    ) -> (Result<TaskOutcome>, Arc<EngineAdapter>) {
        let adapter = Arc::new(EngineAdapter::new(engine));
        let orchestrator = FanOutOrchestrator::new(Arc::clone(&adapter), tag("en"), ordering);
        (orchestrator.run(plan).await, adapter)
    }

    async fn run(engine: &FakeEngine, plan: TranslationPlan) -> Result<TaskOutcome> {
        run_with(Arc::new(engine.clone()), plan, ListOrdering::Arrival).await.0
    }

    #[test]
    fn test_planned_steps_formula() {
        let fixed = SourceLanguage::Fixed(tag("de"));
        assert_eq!(planned_steps(&fixed, 5), 6);
        assert_eq!(planned_steps(&SourceLanguage::Auto, 5), 15);
        assert_eq!(planned_steps(&fixed, 0), 0);
        assert_eq!(planned_steps(&SourceLanguage::Auto, 0), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fixed_source_counts_one_shared_download() {
        let engine = FakeEngine::new();
        let outcome = assert_ok!(run(&engine, plan(json!(["a", "b", "c", "d"]), "ja", Some("en"))).await);

        assert_eq!(outcome.steps, StepStats { planned: 5, completed: 5 });
        assert_eq!(Calls::get(&engine.calls.detect), 0);
        assert_eq!(Calls::get(&engine.calls.downloads), 1);
        assert_eq!(Calls::get(&engine.calls.translate), 4);
        assert_eq!(Calls::get(&engine.calls.opened), 1);
        assert_eq!(Calls::get(&engine.calls.translator_closes), 1);
        assert_eq!(Calls::get(&engine.calls.detector_closes), 1);

        let response = outcome.response;
        assert_eq!(response.source_language, "en");
        assert_eq!(response.target_language, "ja");
        assert_eq!(response.detected_languages["0"], "en");
        let TranslatedTexts::List(mut texts) = response.translated_texts else {
            panic!("expected list output");
        };
        texts.sort();
        assert_eq!(texts, vec!["ja:a", "ja:b", "ja:c", "ja:d"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_auto_detect_runs_three_steps_per_item() {
        let engine = FakeEngine::new()
            .detects("Hallo", "de")
            .detects("Welt", "de")
            .detects("Bonjour", "fr")
            .delay("Hallo", 15)
            .delay("Bonjour", 5);
        let outcome = assert_ok!(
            run(&engine, plan(json!({ "greeting": ["Hallo", "Welt"], "fr": "Bonjour" }), "en", None)).await
        );

        assert_eq!(outcome.steps, StepStats { planned: 9, completed: 9 });
        assert_eq!(Calls::get(&engine.calls.detect), 3);
        assert_eq!(Calls::get(&engine.calls.translate), 3);
        // de-en and fr-en, each prepared once
        assert_eq!(Calls::get(&engine.calls.opened), 2);
        assert_eq!(Calls::get(&engine.calls.downloads), 2);
        assert_eq!(Calls::get(&engine.calls.translator_closes), 2);
        assert_eq!(Calls::get(&engine.calls.detector_closes), 1);

        let response = outcome.response;
        assert_eq!(response.source_language, assemble::MIXED_LANGUAGES);
        assert_eq!(response.detected_languages["greeting"], "de");
        assert_eq!(response.detected_languages["fr"], "fr");

        let TranslatedTexts::Keyed(map) = response.translated_texts else {
            panic!("expected keyed output");
        };
        assert_eq!(map["fr"], KeyedTexts::Text("en:Bonjour".to_string()));
        let KeyedTexts::List(mut greeting) = map["greeting"].clone() else {
            panic!("expected list under greeting");
        };
        greeting.sort();
        assert_eq!(greeting, vec!["en:Hallo", "en:Welt"]);
    }

    #[tokio::test]
    async fn test_same_detected_language_is_summarised() {
        let engine = FakeEngine::new().detects("uno", "es").detects("dos", "es");
        let outcome = assert_ok!(run(&engine, plan(json!({ "a": "uno", "b": "dos" }), "en", Some("auto"))).await);
        assert_eq!(outcome.response.source_language, "es");
    }

    #[tokio::test]
    async fn test_fixed_source_wins_over_detection() {
        let engine = FakeEngine::new().detects("uno", "es").detects("ciao", "it");
        let outcome = assert_ok!(run(&engine, plan(json!({ "a": "uno", "b": "ciao" }), "en", Some("pt"))).await);
        assert_eq!(outcome.response.source_language, "pt");
        assert_eq!(Calls::get(&engine.calls.detect), 0);
    }

    #[tokio::test]
    async fn test_undetermined_detection_falls_back() {
        let engine = FakeEngine::new().detects("???", "und").detects("Ciao", "xx");
        let outcome = assert_ok!(run(&engine, plan(json!(["???", "Ciao"]), "de", None)).await);
        assert_eq!(outcome.response.source_language, "en");
        assert_eq!(outcome.response.detected_languages["0"], "en");
    }

    #[tokio::test]
    async fn test_empty_input_finishes_without_engine_work() {
        for input in [json!([]), json!({}), json!({ "n": 1 })] {
            let engine = FakeEngine::new();
            let outcome = assert_ok!(run(&engine, plan(input.clone(), "de", None)).await);

            assert_eq!(outcome.steps, StepStats { planned: 0, completed: 0 });
            assert_eq!(engine.calls.work(), 0);
            assert_eq!(Calls::get(&engine.calls.detector_closes), 1);
            assert!(outcome.response.detected_languages.is_empty());

            let expected = match input {
                Value::Array(_) => json!([]),
                Value::Object(ref map) if map.is_empty() => json!({}),
                _ => json!({ "n": "" }),
            };
            assert_eq!(serde_json::to_value(&outcome.response.translated_texts).unwrap(), expected);
        }
    }

    #[tokio::test]
    async fn test_empty_input_with_fixed_source_skips_download() {
        let engine = FakeEngine::new();
        let outcome = assert_ok!(run(&engine, plan(json!([]), "de", Some("en"))).await);
        assert_eq!(outcome.response.source_language, "en");
        assert_eq!(Calls::get(&engine.calls.downloads), 0);
        assert_eq!(Calls::get(&engine.calls.detector_closes), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_translate_failure_rejects_whole_request() {
        let engine = FakeEngine::new()
            .fail_translate("three")
            .delay("four", 20)
            .delay("five", 20);
        let input = json!(["one", "two", "three", "four", "five"]);
        let (result, adapter) = run_with(
            Arc::new(engine.clone()),
            plan(input, "de", Some("en")),
            ListOrdering::Arrival,
        )
        .await;

        let err = assert_err!(result);
        assert!(matches!(err, HonyakuError::TranslateFailed(_)));
        assert_eq!(err.code(), "TEXT_TRANSLATE_FAILED");
        assert!(adapter.is_released());
        assert_eq!(Calls::get(&engine.calls.detector_closes), 1);
        assert_eq!(Calls::get(&engine.calls.translator_closes), 1);

        // Let the slow stragglers finish; they must not release again.
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert_eq!(Calls::get(&engine.calls.detector_closes), 1);
        assert_eq!(Calls::get(&engine.calls.translator_closes), 1);
    }

    #[tokio::test]
    async fn test_detection_failure_surfaces_kind() {
        let engine = FakeEngine::new().fail_detect("b");
        let err = assert_err!(run(&engine, plan(json!({ "x": "a", "y": "b" }), "de", None)).await);
        assert_eq!(err.code(), "LANGUAGE_ID_FAILED");
        assert_eq!(Calls::get(&engine.calls.detector_closes), 1);
    }

    #[tokio::test]
    async fn test_shared_download_failure_skips_translation() {
        let engine = FakeEngine::new().fail_download("en-de");
        let err = assert_err!(run(&engine, plan(json!(["a", "b"]), "de", Some("en"))).await);
        assert_eq!(err.code(), "MODEL_DOWNLOAD_FAILED");
        assert_eq!(Calls::get(&engine.calls.translate), 0);
        assert_eq!(Calls::get(&engine.calls.translator_closes), 1);
        assert_eq!(Calls::get(&engine.calls.detector_closes), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_input_ordering_survives_shuffled_completion() {
        let engine = FakeEngine::new()
            .delay("a", 30)
            .delay("b", 20)
            .delay("c", 10);
        let (result, _) = run_with(
            Arc::new(engine),
            plan(json!(["a", "b", "c", "d"]), "fr", Some("en")),
            ListOrdering::Input,
        )
        .await;
        let outcome = assert_ok!(result);
        assert_eq!(
            outcome.response.translated_texts,
            TranslatedTexts::List(vec!["fr:a".into(), "fr:b".into(), "fr:c".into(), "fr:d".into()])
        );
    }

    #[tokio::test]
    async fn test_zero_items_release_through_mock() {
        let mut engine = MockTranslationEngine::new();
        engine.expect_name().return_const("mock");
        engine.expect_detect_language().times(0);
        engine.expect_translator().times(0);
        engine.expect_close_detector().times(1).return_const(());

        let (result, adapter) = run_with(Arc::new(engine), plan(json!([]), "de", None), ListOrdering::Arrival).await;
        assert_ok!(result);
        assert!(adapter.is_released());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_many_items_reach_exactly_zero() {
        let texts: Vec<String> = (0..64).map(|i| format!("line {}", i)).collect();
        let mut engine = FakeEngine::new();
        for (i, text) in texts.iter().enumerate() {
            engine = engine.delay(text, (i % 7) as u64);
        }
        let outcome = assert_ok!(run(&engine, plan(json!(texts), "de", None)).await);

        assert_eq!(outcome.steps, StepStats { planned: 192, completed: 192 });
        assert_eq!(Calls::get(&engine.calls.downloads), 1);
        let TranslatedTexts::List(list) = outcome.response.translated_texts else {
            panic!("expected list output");
        };
        assert_eq!(list.len(), 64);
    }
}
