//! Native synthesizer backend.
//!
//! The synthesizer itself is external. A [`CircuitSynthesizer`] driver
//! reaches it and returns a [`CircuitDescription`]; [`NativeBackend`] turns
//! that description into [`ResourceCounts`] by counting gates per category.
//!
//! Drivers:
//!
//! | Driver | Reaches the synthesizer through | Returns |
//! |--------|---------------------------------|---------|
//! | [`CostCliSynthesizer`] | cost-measurement binary, `--json` | gate tally |
//! | [`QasmCommandSynthesizer`] | program reading coefficients on stdin | QASM text |
//! | [`DylibSynthesizer`] | shared library entry point | QASM text |

use std::ffi::{CStr, c_char, c_int};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use libloading::{Library, Symbol};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use tracing::{debug, info};

use super::process::{CoefficientPayload, program_exists, run_command, timeout_from_secs};
use super::{Backend, BackendAvailability, SynthesisRequest};
use crate::config::{CountStage, NativeConfig, NativeDriverConfig};
use crate::counts::{GateCounts, ResourceCounts};
use crate::error::{BackendError, BackendResult};
use crate::qasm;
use crate::runner::Configuration;
use crate::state::AmplitudeMode;

/// What a synthesizer hands back for one target.
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitDescription {
    /// OpenQASM 2 or 3 source.
    Qasm(String),
    /// Per-category tally computed by the synthesizer itself.
    Tally {
        counts: GateCounts,
        num_qubits: u32,
    },
}

impl CircuitDescription {
    /// Count gates by category and collapse into resource counts.
    pub fn into_resource_counts(self) -> BackendResult<ResourceCounts> {
        match self {
            CircuitDescription::Qasm(source) => {
                let summary = qasm::count_gates(&source)?;
                Ok(summary.counts.to_resource_counts(summary.num_qubits))
            }
            CircuitDescription::Tally { counts, num_qubits } => {
                let mut resources = counts.to_resource_counts(num_qubits);
                // Tallies cover the Clifford+T categories only.
                resources.rotations = None;
                Ok(resources)
            }
        }
    }
}

/// A way of reaching the external synthesizer.
#[async_trait]
pub trait CircuitSynthesizer: Send + Sync {
    /// Human-readable description for logs.
    fn describe(&self) -> String;

    /// `Err(reason)` when the synthesizer cannot be reached.
    async fn check(&self) -> Result<(), String>;

    /// Synthesize a circuit for the request's target.
    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> BackendResult<CircuitDescription>;
}

/// Backend delegating to an external circuit synthesizer.
pub struct NativeBackend {
    id: String,
    synthesizer: Box<dyn CircuitSynthesizer>,
}

impl NativeBackend {
    /// Wrap a synthesizer driver under the given label.
    pub fn new(id: impl Into<String>, synthesizer: Box<dyn CircuitSynthesizer>) -> Self {
        Self {
            id: id.into(),
            synthesizer,
        }
    }

    /// Build from configuration. `None` when the native backend is disabled.
    pub fn from_config(id: impl Into<String>, config: &NativeConfig) -> Option<Self> {
        let timeout = timeout_from_secs(config.timeout_secs);
        let synthesizer: Box<dyn CircuitSynthesizer> = match &config.driver {
            NativeDriverConfig::CostCli { binary, stage } => {
                Box::new(CostCliSynthesizer::new(binary.clone(), *stage).with_timeout(timeout))
            }
            NativeDriverConfig::QasmCommand { program, args } => Box::new(
                QasmCommandSynthesizer::new(program.clone())
                    .with_args(args.clone())
                    .with_timeout(timeout),
            ),
            NativeDriverConfig::Library { path } => Box::new(DylibSynthesizer::load(path)),
            NativeDriverConfig::Disabled => return None,
        };
        Some(Self::new(id, synthesizer))
    }
}

#[async_trait]
impl Backend for NativeBackend {
    fn id(&self) -> &str {
        &self.id
    }

    async fn availability(&self) -> BackendAvailability {
        match self.synthesizer.check().await {
            Ok(()) => BackendAvailability::always_available(),
            Err(reason) => BackendAvailability::unavailable(reason),
        }
    }

    async fn synthesize(&self, request: &SynthesisRequest<'_>) -> BackendResult<ResourceCounts> {
        debug!(
            "{}: synthesizing via {}",
            self.id,
            self.synthesizer.describe()
        );
        self.synthesizer
            .synthesize(request)
            .await?
            .into_resource_counts()
    }
}

// ---------------------------------------------------------------------------
// Cost-measurement binary
// ---------------------------------------------------------------------------

/// JSON printed by the cost-measurement binary. Extra keys are ignored.
#[derive(Debug, Clone, Deserialize)]
struct CostReport {
    prep: GateCounts,
    ct: GateCounts,
}

impl CostReport {
    fn parse(stdout: &str) -> BackendResult<Self> {
        Ok(serde_json::from_str(stdout.trim())?)
    }

    fn stage(&self, stage: CountStage) -> GateCounts {
        match stage {
            CountStage::Prep => self.prep,
            CountStage::CliffordT => self.ct,
        }
    }
}

/// `(n, cardinality, seed, eps bits)` of one binary invocation.
type ReportKey = (u32, u64, u64, u64);

type PendingReports = FxHashMap<ReportKey, (Arc<CostReport>, usize)>;

/// Reports of one binary shared by several stage drivers. The first stage
/// of a trial invokes the binary; the others read the stored report.
struct SharedReports {
    consumers: usize,
    /// Report and the number of stages that have not read it yet.
    pending: Mutex<PendingReports>,
}

impl SharedReports {
    fn new(consumers: usize) -> Self {
        Self {
            consumers,
            pending: Mutex::new(FxHashMap::default()),
        }
    }

    async fn get_or_fetch<F, Fut>(&self, key: ReportKey, fetch: F) -> BackendResult<Arc<CostReport>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = BackendResult<CostReport>>,
    {
        if let Some(report) = self.take(key)? {
            return Ok(report);
        }
        let report = Arc::new(fetch().await?);
        if self.consumers > 1 {
            self.lock()?.insert(key, (Arc::clone(&report), self.consumers - 1));
        }
        Ok(report)
    }

    fn take(&self, key: ReportKey) -> BackendResult<Option<Arc<CostReport>>> {
        let mut pending = self.lock()?;
        let Some((report, remaining)) = pending.get_mut(&key) else {
            return Ok(None);
        };
        let report = Arc::clone(report);
        *remaining -= 1;
        if *remaining == 0 {
            pending.remove(&key);
        }
        Ok(Some(report))
    }

    fn lock(&self) -> BackendResult<MutexGuard<'_, PendingReports>> {
        self.pending
            .lock()
            .map_err(|_| BackendError::Unavailable("cost report cache poisoned".into()))
    }
}

/// Driver for `<binary> -n <n> -c <cardinality> -s <seed> -e <eps> --json`.
///
/// The binary draws its own target from `(n, cardinality, seed)` with
/// standard-normal real weights, so only `randomized` sweeps are accepted.
/// Seed 0 makes the binary pick a random seed and is refused.
pub struct CostCliSynthesizer {
    binary: PathBuf,
    stage: CountStage,
    timeout: Option<Duration>,
    shared: Option<Arc<SharedReports>>,
}

impl CostCliSynthesizer {
    pub fn new(binary: impl Into<PathBuf>, stage: CountStage) -> Self {
        Self {
            binary: binary.into(),
            stage,
            timeout: None,
            shared: None,
        }
    }

    /// One driver per stage, all fed by a single invocation per trial.
    pub fn for_stages(
        binary: impl Into<PathBuf>,
        stages: &[CountStage],
        timeout: Option<Duration>,
    ) -> Vec<Self> {
        let binary = binary.into();
        let shared = Arc::new(SharedReports::new(stages.len()));
        stages
            .iter()
            .map(|&stage| Self {
                binary: binary.clone(),
                stage,
                timeout,
                shared: Some(Arc::clone(&shared)),
            })
            .collect()
    }

    /// Kill the binary after `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    fn admit(request: &SynthesisRequest<'_>) -> BackendResult<()> {
        if request.mode != AmplitudeMode::Randomized {
            return Err(BackendError::UnsupportedState(format!(
                "cost binary draws randomized real targets, not '{}'",
                request.mode
            )));
        }
        if request.configuration.seed == 0 {
            return Err(BackendError::UnsupportedState(
                "seed 0 leaves the cost binary unseeded".into(),
            ));
        }
        Ok(())
    }

    async fn invoke(&self, config: &Configuration) -> BackendResult<CostReport> {
        let args = vec![
            "-n".to_string(),
            config.n.to_string(),
            "-c".to_string(),
            config.cardinality.to_string(),
            "-s".to_string(),
            config.seed.to_string(),
            "-e".to_string(),
            format!("{:e}", config.eps),
            "--json".to_string(),
        ];
        let stdout = run_command(&self.binary, &args, None, self.timeout).await?;
        CostReport::parse(&stdout)
    }
}

#[async_trait]
impl CircuitSynthesizer for CostCliSynthesizer {
    fn describe(&self) -> String {
        format!("{} ({})", self.binary.display(), self.stage.json_key())
    }

    async fn check(&self) -> Result<(), String> {
        if program_exists(&self.binary) {
            Ok(())
        } else {
            Err(format!("cost binary not found: {}", self.binary.display()))
        }
    }

    async fn synthesize(
        &self,
        request: &SynthesisRequest<'_>,
    ) -> BackendResult<CircuitDescription> {
        Self::admit(request)?;
        let config = request.configuration;
        let report = match &self.shared {
            Some(shared) => {
                let key = (config.n, config.cardinality, config.seed, config.eps.to_bits());
                shared.get_or_fetch(key, || self.invoke(config)).await?
            }
            None => Arc::new(self.invoke(config).await?),
        };
        Ok(CircuitDescription::Tally {
            counts: report.stage(self.stage),
            num_qubits: config.n,
        })
    }
}

// ---------------------------------------------------------------------------
// QASM-emitting program
// ---------------------------------------------------------------------------

/// Driver for a program that reads `{"coefficients": [...], "eps": ...}`
/// on stdin and prints an OpenQASM circuit.
pub struct QasmCommandSynthesizer {
    program: PathBuf,
    args: Vec<String>,
    timeout: Option<Duration>,
}

impl QasmCommandSynthesizer {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            timeout: None,
        }
    }

    /// Fixed arguments passed before the payload is written.
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

#[async_trait]
impl CircuitSynthesizer for QasmCommandSynthesizer {
    fn describe(&self) -> String {
        self.program.display().to_string()
    }

    async fn check(&self) -> Result<(), String> {
        if program_exists(&self.program) {
            Ok(())
        } else {
            Err(format!("synthesizer not found: {}", self.program.display()))
        }
    }

    async fn synthesize(
        &self,
        request: &SynthesisRequest<'_>,
    ) -> BackendResult<CircuitDescription> {
        let payload = CoefficientPayload::real(request.state, request.eps())?.to_bytes()?;
        let stdout = run_command(
            &self.program,
            &self.args,
            Some(payload.as_slice()),
            self.timeout,
        )
        .await?;
        if stdout.trim().is_empty() {
            return Err(BackendError::MalformedOutput(
                "synthesizer printed no circuit".into(),
            ));
        }
        Ok(CircuitDescription::Qasm(stdout))
    }
}

// ---------------------------------------------------------------------------
// Shared library
// ---------------------------------------------------------------------------

/// `int qsp_prepare_state(const double* coeffs, size_t len, double eps, char** qasm_out)`
type FnPrepareState = unsafe extern "C" fn(*const f64, usize, f64, *mut *mut c_char) -> c_int;

/// `void qsp_free_string(char* s)`
type FnFreeString = unsafe extern "C" fn(*mut c_char);

const PREPARE_SYMBOL: &[u8] = b"qsp_prepare_state";
const FREE_SYMBOL: &[u8] = b"qsp_free_string";

/// A loaded synthesis library with its entry points resolved.
struct LoadedLibrary {
    /// Keeps the library mapped while the function pointers are in use.
    _library: Library,
    prepare: FnPrepareState,
    free: FnFreeString,
}

impl LoadedLibrary {
    fn load(path: &Path) -> Result<Self, String> {
        // SAFETY: loading an external library runs its initializers; the
        // caller chose the path.
        let library = unsafe { Library::new(path) }
            .map_err(|e| format!("failed to load {}: {}", path.display(), e))?;

        // SAFETY: the declared types match the exported C signatures.
        let (prepare, free) = unsafe {
            let prepare: Symbol<FnPrepareState> = library
                .get(PREPARE_SYMBOL)
                .map_err(|e| format!("missing symbol qsp_prepare_state: {e}"))?;
            let free: Symbol<FnFreeString> = library
                .get(FREE_SYMBOL)
                .map_err(|e| format!("missing symbol qsp_free_string: {e}"))?;
            (*prepare, *free)
        };

        Ok(Self {
            _library: library,
            prepare,
            free,
        })
    }

    fn prepare(&self, coefficients: &[f64], eps: f64) -> BackendResult<String> {
        let mut out: *mut c_char = std::ptr::null_mut();
        // SAFETY: `coefficients` outlives the call and `out` is a valid
        // location for the returned string.
        let status = unsafe {
            (self.prepare)(coefficients.as_ptr(), coefficients.len(), eps, &mut out)
        };

        let text = if out.is_null() {
            None
        } else {
            // SAFETY: a non-null `out` is a NUL-terminated string owned by
            // the library until handed back to `qsp_free_string`.
            let text = unsafe { CStr::from_ptr(out) }.to_string_lossy().into_owned();
            unsafe { (self.free)(out) };
            Some(text)
        };

        match (status, text) {
            (0, Some(qasm)) => Ok(qasm),
            (0, None) => Err(BackendError::Library(
                "qsp_prepare_state returned no circuit".into(),
            )),
            (code, message) => Err(BackendError::Library(format!(
                "qsp_prepare_state failed with status {code}{}",
                message.map(|m| format!(": {m}")).unwrap_or_default()
            ))),
        }
    }
}

/// Driver calling `qsp_prepare_state` in a shared library.
///
/// The library is a single instance; calls are serialized through a mutex.
/// A library that fails to load leaves the backend unavailable.
pub struct DylibSynthesizer {
    path: PathBuf,
    library: Result<Mutex<LoadedLibrary>, String>,
}

impl DylibSynthesizer {
    /// Load the library at `path`. Failure is reported by `check()`.
    pub fn load(path: &Path) -> Self {
        let library = LoadedLibrary::load(path).map(Mutex::new);
        if library.is_ok() {
            info!("Loaded synthesis library '{}'", path.display());
        }
        Self {
            path: path.to_path_buf(),
            library,
        }
    }
}

#[async_trait]
impl CircuitSynthesizer for DylibSynthesizer {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn check(&self) -> Result<(), String> {
        self.library.as_ref().map(|_| ()).map_err(String::clone)
    }

    async fn synthesize(
        &self,
        request: &SynthesisRequest<'_>,
    ) -> BackendResult<CircuitDescription> {
        let library = self
            .library
            .as_ref()
            .map_err(|reason| BackendError::Unavailable(reason.clone()))?;
        let coefficients = request.state.real_coefficients().ok_or_else(|| {
            BackendError::UnsupportedState("library entry point takes real coefficients".into())
        })?;
        let guard = library
            .lock()
            .map_err(|_| BackendError::Library("library mutex poisoned".into()))?;
        let qasm = guard.prepare(&coefficients, request.eps())?;
        Ok(CircuitDescription::Qasm(qasm))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::state::{AmplitudeVector, StateGenerator};

    const REPORT: &str = r#"{"n":3,"cardinality":4,"seed":42,"eps":0.001,
        "prep":{"cx":6,"t":0,"tdg":0,"s":0,"sdg":0,"x":1,"z":0},
        "ct":{"cx":6,"t":40,"tdg":38,"s":12,"sdg":9,"x":3,"z":2},
        "ct_err_max":0.0009}"#;

    fn request<'a>(
        configuration: &'a Configuration,
        state: &'a AmplitudeVector,
        mode: AmplitudeMode,
    ) -> SynthesisRequest<'a> {
        SynthesisRequest {
            configuration,
            state,
            mode,
        }
    }

    #[test]
    fn test_parse_cost_report_stages() {
        let report = CostReport::parse(REPORT).unwrap();
        let ct = report.stage(CountStage::CliffordT);
        assert_eq!(ct.t_count(), 78);
        assert_eq!(ct.s_family(), 21);
        assert_eq!(report.stage(CountStage::Prep).cx, 6);
    }

    #[test]
    fn test_malformed_report() {
        assert!(matches!(
            CostReport::parse("not json"),
            Err(BackendError::MalformedOutput(_))
        ));
    }

    #[test]
    fn test_report_requires_both_stages() {
        let prep_only = r#"{"prep":{"cx":1,"t":0,"tdg":0,"s":0,"sdg":0,"x":0,"z":0}}"#;
        assert!(matches!(
            CostReport::parse(prep_only),
            Err(BackendError::MalformedOutput(_))
        ));
    }

    #[test]
    fn test_tally_reports_no_rotations() {
        let counts = GateCounts {
            cx: 2,
            t: 3,
            tdg: 1,
            ..Default::default()
        };
        let resources = CircuitDescription::Tally {
            counts,
            num_qubits: 3,
        }
        .into_resource_counts()
        .unwrap();
        assert_eq!(resources.t, 4);
        assert_eq!(resources.rotations, None);
        assert_eq!(resources.qubits, 3);
    }

    #[test]
    fn test_qasm_description_counts_gates() {
        let resources = CircuitDescription::Qasm(
            "OPENQASM 2.0;\nqreg q[2];\nh q[0];\nt q[0];\ntdg q[1];\ncx q[0],q[1];\n".into(),
        )
        .into_resource_counts()
        .unwrap();
        assert_eq!(resources.t, 2);
        assert_eq!(resources.cx, Some(1));
        assert_eq!(resources.total_gates, 4);
        assert_eq!(resources.qubits, 2);
    }

    #[tokio::test]
    async fn test_missing_library_is_unavailable() {
        let backend = NativeBackend::new(
            "native",
            Box::new(DylibSynthesizer::load(Path::new("/nonexistent/libqsp.so"))),
        );
        let availability = backend.availability().await;
        assert!(!availability.is_available);
        assert!(availability.status_message.is_some());
    }

    #[tokio::test]
    async fn test_cost_cli_rejects_complex_targets() {
        let state = StateGenerator::generate(3, 4, 1, AmplitudeMode::RandomizedComplex).unwrap();
        let configuration = Configuration::new(3, 4, 1e-3, 0, 1);
        let err = CostCliSynthesizer::new("/nonexistent/prepare_state", CountStage::CliffordT)
            .synthesize(&request(
                &configuration,
                &state,
                AmplitudeMode::RandomizedComplex,
            ))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::UnsupportedState(_)));
    }

    #[tokio::test]
    async fn test_cost_cli_rejects_uniform_targets() {
        let state = StateGenerator::generate(3, 4, 1, AmplitudeMode::Uniform).unwrap();
        let configuration = Configuration::new(3, 4, 1e-3, 0, 1);
        let err = CostCliSynthesizer::new("/nonexistent/prepare_state", CountStage::CliffordT)
            .synthesize(&request(&configuration, &state, AmplitudeMode::Uniform))
            .await
            .unwrap_err();
        assert!(matches!(err, BackendError::UnsupportedState(_)));
    }

    #[tokio::test]
    async fn test_cost_cli_refuses_seed_zero() {
        let state = StateGenerator::generate(3, 4, 0, AmplitudeMode::Randomized).unwrap();
        let configuration = Configuration::new(3, 4, 1e-3, 0, 0);
        let err = CostCliSynthesizer::new("/nonexistent/prepare_state", CountStage::Prep)
            .synthesize(&request(&configuration, &state, AmplitudeMode::Randomized))
            .await
            .unwrap_err();
        match err {
            BackendError::UnsupportedState(reason) => assert!(reason.contains("seed 0")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_shared_report_fetched_once_per_trial() {
        let shared = SharedReports::new(2);
        let calls = AtomicUsize::new(0);
        let fetch = || async {
            calls.fetch_add(1, Ordering::SeqCst);
            CostReport::parse(REPORT)
        };

        let key = (3, 4, 42, 1e-3f64.to_bits());
        let prep = shared.get_or_fetch(key, fetch).await.unwrap();
        let ct = shared.get_or_fetch(key, fetch).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(prep.stage(CountStage::Prep).cx, 6);
        assert_eq!(ct.stage(CountStage::CliffordT).t_count(), 78);

        // Every stage has read it, so the next trial with the same key
        // invokes again.
        shared.get_or_fetch(key, fetch).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let other = (3, 4, 43, 1e-3f64.to_bits());
        shared.get_or_fetch(other, fetch).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_stage_drivers_share_one_cache() {
        let drivers = CostCliSynthesizer::for_stages(
            "prepare_state",
            &[CountStage::Prep, CountStage::CliffordT],
            None,
        );
        assert_eq!(drivers.len(), 2);
        let (a, b) = (drivers[0].shared.as_ref(), drivers[1].shared.as_ref());
        assert!(Arc::ptr_eq(a.unwrap(), b.unwrap()));
        assert_eq!(drivers[1].stage, CountStage::CliffordT);
    }

    #[test]
    fn test_disabled_driver_builds_nothing() {
        assert!(NativeBackend::from_config("native", &NativeConfig::default()).is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_qasm_command_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("synth.sh");
        std::fs::write(
            &script,
            "cat > /dev/null\nprintf 'OPENQASM 2.0;\\nqreg q[2];\\nt q[0];\\ncx q[0],q[1];\\n'\n",
        )
        .unwrap();

        let synthesizer =
            QasmCommandSynthesizer::new("sh").with_args(vec![script.display().to_string()]);
        let backend = NativeBackend::new("native", Box::new(synthesizer));
        assert!(backend.availability().await.is_available);

        let state = StateGenerator::generate(2, 2, 5, AmplitudeMode::Randomized).unwrap();
        let configuration = Configuration::new(2, 2, 1e-3, 0, 5);
        let resources = backend
            .synthesize(&request(&configuration, &state, AmplitudeMode::Randomized))
            .await
            .unwrap();
        assert_eq!(resources.t, 1);
        assert_eq!(resources.cx, Some(1));
    }
}
