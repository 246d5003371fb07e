//! C6: Simulation Driver — the per-(strategy, config, dataFile) run loop
//! (spec.md §4.6). Wires the matching engine, ledger, and marker store
//! together, drives bars from a `DataSource` into both the matching engine
//! and the strategy, brackets insufficient-data runs with marks, and
//! derives + writes the run's artifacts at stream end.
//!
//! The outer multi-run loop (strategies × configs × data files), result
//! folder naming/timestamping, and CLI are out of scope per spec.md §1;
//! this is the single-run slice.

use crate::config::Config;
use crate::data_source::DataSource;
use crate::domain::Mark;
use crate::error::DriverError;
use crate::ledger::Ledger;
use crate::marker::MarkerStore;
use crate::matching::MatchingEngine;
use crate::stats::{ArtifactPaths, StatisticsDeriver, TradeStats};
use crate::strategy::{HostApi, Strategy, StrategyError};
use crate::version::EngineVersion;
use chrono::Utc;
use rust_decimal::Decimal;
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// The kernel's own engine version, compared against a strategy's reported
/// `getRuntimeEngineVersion()` (spec.md §4.6 step 3).
pub const ENGINE_VERSION: &str = "1.2.0";

/// Cooperative cancellation signal, checked at the top of each bar
/// iteration (spec.md §5). Plain atomic flag rather than an async runtime
/// primitive — the kernel is single-threaded and synchronous throughout.
#[derive(Clone, Default)]
pub struct CancellationToken(Arc<AtomicBool>);

impl CancellationToken {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Lifecycle callbacks exposed to a driver layer above the kernel
/// (spec.md §4.6). `on_backtest_start`/`on_strategy_start`/`on_run_start`/
/// `on_process_data` errors abort the run with `CallbackFailed`; the
/// `_end` variants are fire-and-forget and cannot fail the run.
pub trait DriverCallbacks {
    fn on_backtest_start(&mut self) -> Result<(), String> {
        Ok(())
    }
    fn on_backtest_end(&mut self, _err: Option<&DriverError>) {}
    fn on_strategy_start(&mut self) -> Result<(), String> {
        Ok(())
    }
    fn on_strategy_end(&mut self) {}
    fn on_run_start(&mut self) -> Result<(), String> {
        Ok(())
    }
    fn on_run_end(&mut self) {}
    fn on_process_data(&mut self, _index: usize, _count: usize) -> Result<(), String> {
        Ok(())
    }
}

/// Callback set for callers with no lifecycle hooks to wire up.
#[derive(Default)]
pub struct NullCallbacks;
impl DriverCallbacks for NullCallbacks {}

/// Everything the run produced: the live engine/marker handles (so a
/// caller can inspect the ledger without re-reading the Parquet files it
/// just wrote) and the derived per-symbol statistics.
pub struct RunOutcome {
    pub engine: Rc<RefCell<MatchingEngine>>,
    pub markers: Rc<RefCell<MarkerStore>>,
    pub stats: Vec<TradeStats>,
}

/// Runs one `(strategy, config, dataFile)` backtest to completion (or to
/// the first fatal error / cancellation), writing artifacts under
/// `result_dir` per spec.md §6's output layout.
pub struct SimulationDriver;

impl SimulationDriver {
    #[allow(clippy::too_many_arguments)]
    pub fn run(
        strategy: &mut dyn Strategy,
        data_source: &mut dyn DataSource,
        config: &Config,
        config_text: &str,
        run_id: &str,
        strategy_path: &str,
        data_path: &str,
        result_dir: &Path,
        cancellation: &CancellationToken,
        callbacks: &mut dyn DriverCallbacks,
    ) -> Result<RunOutcome, DriverError> {
        let outcome = Self::run_inner(
            strategy,
            data_source,
            config,
            config_text,
            run_id,
            strategy_path,
            data_path,
            result_dir,
            cancellation,
            callbacks,
        );
        callbacks.on_backtest_end(outcome.as_ref().err());
        outcome
    }

    #[allow(clippy::too_many_arguments)]
    fn run_inner(
        strategy: &mut dyn Strategy,
        data_source: &mut dyn DataSource,
        config: &Config,
        config_text: &str,
        run_id: &str,
        strategy_path: &str,
        data_path: &str,
        result_dir: &Path,
        cancellation: &CancellationToken,
        callbacks: &mut dyn DriverCallbacks,
    ) -> Result<RunOutcome, DriverError> {
        callbacks
            .on_backtest_start()
            .map_err(DriverError::CallbackFailed)?;

        let engine = Rc::new(RefCell::new(MatchingEngine::new(
            config.initial_capital,
            config.commission(),
            config.decimal_precision,
        )));
        let markers = Rc::new(RefCell::new(MarkerStore::new()));

        let api = HostApi::new(engine.clone(), markers.clone());
        strategy
            .initialize_api(api)
            .map_err(|e| DriverError::Config(e.to_string()))?;

        callbacks
            .on_strategy_start()
            .map_err(DriverError::CallbackFailed)?;

        strategy
            .initialize(config_text)
            .map_err(|e| DriverError::Config(e.to_string()))?;

        Self::check_version_compatibility(strategy)?;

        callbacks
            .on_run_start()
            .map_err(DriverError::CallbackFailed)?;

        data_source
            .initialize(data_path)
            .map_err(|e| DriverError::Data(e.to_string()))?;
        let count = data_source
            .count(config.start_time, config.end_time)
            .map_err(|e| DriverError::Data(e.to_string()))?;

        let run_result = Self::drive_bars(
            strategy,
            data_source,
            config,
            &engine,
            &markers,
            count,
            cancellation,
            callbacks,
        );

        if let Err(err) = run_result {
            if matches!(err, DriverError::Cancelled) {
                Self::cleanup_run(&engine, &markers);
            }
            return Err(err);
        }

        callbacks.on_run_end();
        callbacks.on_strategy_end();

        let stats = Self::write_artifacts(
            &engine,
            &markers,
            data_source,
            run_id,
            strategy_path,
            data_path,
            result_dir,
        )?;

        Ok(RunOutcome {
            engine,
            markers,
            stats,
        })
    }

    fn check_version_compatibility(strategy: &mut dyn Strategy) -> Result<(), DriverError> {
        let engine_version = EngineVersion::parse(ENGINE_VERSION)
            .expect("ENGINE_VERSION constant is a well-formed semver string");
        let strategy_version_str = strategy
            .get_runtime_engine_version()
            .map_err(|e| DriverError::State(e.to_string()))?;
        let strategy_version = EngineVersion::parse(&strategy_version_str).map_err(|_| {
            DriverError::VersionMismatch {
                engine: ENGINE_VERSION.to_string(),
                strategy: strategy_version_str.clone(),
            }
        })?;
        if !engine_version.is_compatible_with(&strategy_version) {
            return Err(DriverError::VersionMismatch {
                engine: ENGINE_VERSION.to_string(),
                strategy: strategy_version_str,
            });
        }
        Ok(())
    }

    /// The per-bar loop: pending-book processing, strategy callback,
    /// insufficient-data bracketing, strategy-error marks, lifecycle
    /// progress callback.
    fn drive_bars(
        strategy: &mut dyn Strategy,
        data_source: &mut dyn DataSource,
        config: &Config,
        engine: &Rc<RefCell<MatchingEngine>>,
        markers: &Rc<RefCell<MarkerStore>>,
        count: usize,
        cancellation: &CancellationToken,
        callbacks: &mut dyn DriverCallbacks,
    ) -> Result<(), DriverError> {
        let mut insufficient_active = false;
        let mut last_insufficient_bar_id: Option<String> = None;
        let mut index = 0usize;

        for bar_result in data_source.read_all(config.start_time, config.end_time) {
            if cancellation.is_cancelled() {
                return Err(DriverError::Cancelled);
            }

            let bar = bar_result.map_err(|e| DriverError::Data(e.to_string()))?;

            engine.borrow_mut().update_current_market_data(bar.clone());

            match strategy.process_data(&bar) {
                Ok(()) => {
                    if insufficient_active {
                        let last_id = last_insufficient_bar_id
                            .take()
                            .expect("insufficient_active implies a tracked bar id");
                        markers.borrow_mut().mark(
                            Mark::warning(
                                last_id,
                                "Insufficient Data",
                                "Insufficient data error ended",
                            )
                            .category("InsufficientData"),
                        );
                        insufficient_active = false;
                    }
                }
                Err(StrategyError::InsufficientData { .. }) => {
                    if !insufficient_active {
                        markers.borrow_mut().mark(
                            Mark::warning(
                                bar.id.clone(),
                                "Insufficient Data",
                                "Insufficient data error started",
                            )
                            .category("InsufficientData"),
                        );
                        insufficient_active = true;
                    }
                    last_insufficient_bar_id = Some(bar.id.clone());
                }
                Err(StrategyError::Other(message)) => {
                    markers.borrow_mut().mark(
                        Mark::error(bar.id.clone(), "Strategy Error", message)
                            .category("StrategyError"),
                    );
                }
            }

            callbacks
                .on_process_data(index, count)
                .map_err(DriverError::CallbackFailed)?;
            index += 1;
        }

        if insufficient_active {
            if let Some(last_id) = last_insufficient_bar_id {
                markers.borrow_mut().mark(
                    Mark::warning(last_id, "Insufficient Data", "Insufficient data error ended")
                        .category("InsufficientData"),
                );
            }
        }

        Ok(())
    }

    fn cleanup_run(engine: &Rc<RefCell<MatchingEngine>>, markers: &Rc<RefCell<MarkerStore>>) {
        engine.borrow_mut().ledger_mut().cleanup();
        engine.borrow_mut().reset(Decimal::ZERO);
        markers.borrow_mut().cleanup();
    }

    #[allow(clippy::too_many_arguments)]
    fn write_artifacts(
        engine: &Rc<RefCell<MatchingEngine>>,
        markers: &Rc<RefCell<MarkerStore>>,
        data_source: &dyn DataSource,
        run_id: &str,
        strategy_path: &str,
        data_path: &str,
        result_dir: &Path,
    ) -> Result<Vec<TradeStats>, DriverError> {
        let engine_ref = engine.borrow();
        let ledger: &Ledger = engine_ref.ledger();

        let state_dir = result_dir.join("state.db");
        ledger
            .write(&state_dir)
            .map_err(|e| DriverError::State(e.to_string()))?;
        markers
            .borrow()
            .write(result_dir)
            .map_err(|e| DriverError::State(e.to_string()))?;

        let paths = ArtifactPaths {
            trades_path: state_dir.join("trades.parquet").display().to_string(),
            orders_path: state_dir.join("orders.parquet").display().to_string(),
            marks_path: result_dir.join("marks.parquet").display().to_string(),
            strategy_path: strategy_path.to_string(),
            data_path: data_path.to_string(),
        };

        let deriver = StatisticsDeriver::new(ledger, data_source);
        let stats = deriver.derive(run_id, Utc::now(), &paths);

        let stats_yaml =
            serde_yaml::to_string(&stats).map_err(|e| DriverError::State(e.to_string()))?;
        std::fs::write(result_dir.join("stats.yaml"), stats_yaml)
            .map_err(|e| DriverError::State(e.to_string()))?;

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_source::{DataSourceError, InMemoryDataSource};
    use crate::domain::{Bar, ExecuteOrder, OrderSide, PositionType};
    use chrono::TimeZone;
    use rust_decimal_macros::dec;
    use std::cell::Cell;

    fn bar(symbol: &str, high: Decimal, low: Decimal, ts: i64) -> Bar {
        Bar {
            id: format!("{symbol}-{ts}"),
            symbol: symbol.into(),
            time: Utc.timestamp_opt(ts, 0).unwrap(),
            open: (high + low) / dec!(2),
            high,
            low,
            close: (high + low) / dec!(2),
            volume: 1000.0,
        }
    }

    /// Strategy double: always-long buyer that returns `InsufficientData`
    /// on a configured set of bar indices, used to exercise S6's
    /// bracketing behavior.
    struct ScriptedStrategy {
        api: Option<HostApi>,
        insufficient_on: Vec<usize>,
        seen: usize,
        engine_version: String,
    }

    impl ScriptedStrategy {
        fn new(insufficient_on: Vec<usize>, engine_version: &str) -> Self {
            Self {
                api: None,
                insufficient_on,
                seen: 0,
                engine_version: engine_version.to_string(),
            }
        }
    }

    impl Strategy for ScriptedStrategy {
        fn initialize_api(&mut self, api: HostApi) -> Result<(), StrategyError> {
            self.api = Some(api);
            Ok(())
        }

        fn initialize(&mut self, _config_text: &str) -> Result<(), StrategyError> {
            Ok(())
        }

        fn process_data(&mut self, bar: &Bar) -> Result<(), StrategyError> {
            let index = self.seen;
            self.seen += 1;
            if self.insufficient_on.contains(&index) {
                return Err(StrategyError::InsufficientData {
                    requested: 20,
                    got: index,
                    symbol: bar.symbol.clone(),
                });
            }
            Ok(())
        }

        fn name(&self) -> &str {
            "scripted"
        }

        fn get_runtime_engine_version(&self) -> Result<String, StrategyError> {
            Ok(self.engine_version.clone())
        }

        fn get_identifier(&self) -> Result<String, StrategyError> {
            Ok("scripted-1".to_string())
        }
    }

    fn seven_bars() -> Vec<Bar> {
        (0..7)
            .map(|i| bar("AAPL", dec!(105), dec!(95), i * 60))
            .collect()
    }

    fn sample_config() -> Config {
        Config::from_yaml("initial_capital: 100000\ndecimal_precision: 1\n").unwrap()
    }

    // S6 — insufficient-data bracketing.
    #[test]
    fn insufficient_data_brackets_started_and_ended_marks() {
        let mut strategy = ScriptedStrategy::new(vec![2, 3, 4], ENGINE_VERSION);
        let mut source = InMemoryDataSource::new(seven_bars());
        let config = sample_config();
        let dir = tempdir();
        let mut callbacks = NullCallbacks;

        let outcome = SimulationDriver::run(
            &mut strategy,
            &mut source,
            &config,
            "initial_capital: 100000",
            "run-1",
            "strategy.wasm",
            "data.parquet",
            dir.path(),
            &CancellationToken::new(),
            &mut callbacks,
        )
        .unwrap();

        let marks = outcome.markers.borrow();
        let marks = marks.marks();
        assert_eq!(marks.len(), 2);
        assert_eq!(marks[0].message, "Insufficient data error started");
        assert_eq!(marks[0].market_data_id, "AAPL-120");
        assert_eq!(marks[1].message, "Insufficient data error ended");
        assert_eq!(marks[1].market_data_id, "AAPL-240");
    }

    // S7 — version gate.
    #[test]
    fn incompatible_strategy_version_aborts_before_process_data() {
        let mut strategy = ScriptedStrategy::new(vec![], "1.3.0");
        let mut source = InMemoryDataSource::new(seven_bars());
        let config = sample_config();
        let dir = tempdir();
        let mut callbacks = NullCallbacks;

        let result = SimulationDriver::run(
            &mut strategy,
            &mut source,
            &config,
            "initial_capital: 100000",
            "run-1",
            "strategy.wasm",
            "data.parquet",
            dir.path(),
            &CancellationToken::new(),
            &mut callbacks,
        );

        assert!(matches!(result, Err(DriverError::VersionMismatch { .. })));
        assert_eq!(strategy.seen, 0);
    }

    #[test]
    fn cancellation_mid_run_aborts_without_writing_artifacts() {
        let mut strategy = ScriptedStrategy::new(vec![], ENGINE_VERSION);
        let mut source = InMemoryDataSource::new(seven_bars());
        let config = sample_config();
        let dir = tempdir();
        let mut callbacks = NullCallbacks;
        let cancellation = CancellationToken::new();
        cancellation.cancel();

        let result = SimulationDriver::run(
            &mut strategy,
            &mut source,
            &config,
            "initial_capital: 100000",
            "run-1",
            "strategy.wasm",
            "data.parquet",
            dir.path(),
            &cancellation,
            &mut callbacks,
        );

        assert!(matches!(result, Err(DriverError::Cancelled)));
        assert!(!dir.path().join("stats.yaml").exists());
    }

    #[test]
    fn on_backtest_end_fires_exactly_once_with_terminal_error() {
        struct CountingCallbacks {
            end_calls: Cell<usize>,
        }
        impl DriverCallbacks for CountingCallbacks {
            fn on_backtest_end(&mut self, err: Option<&DriverError>) {
                self.end_calls.set(self.end_calls.get() + 1);
                assert!(matches!(err, Some(DriverError::VersionMismatch { .. })));
            }
        }

        let mut strategy = ScriptedStrategy::new(vec![], "9.9.9");
        let mut source = InMemoryDataSource::new(seven_bars());
        let config = sample_config();
        let dir = tempdir();
        let mut callbacks = CountingCallbacks { end_calls: Cell::new(0) };

        let _ = SimulationDriver::run(
            &mut strategy,
            &mut source,
            &config,
            "initial_capital: 100000",
            "run-1",
            "strategy.wasm",
            "data.parquet",
            dir.path(),
            &CancellationToken::new(),
            &mut callbacks,
        );

        assert_eq!(callbacks.end_calls.get(), 1);
    }

    struct FailingDataSource;
    impl DataSource for FailingDataSource {
        fn initialize(&mut self, _path: &str) -> Result<(), DataSourceError> {
            Ok(())
        }
        fn count(
            &self,
            _start: Option<chrono::DateTime<Utc>>,
            _end: Option<chrono::DateTime<Utc>>,
        ) -> Result<usize, DataSourceError> {
            Ok(1)
        }
        fn read_all(
            &self,
            _start: Option<chrono::DateTime<Utc>>,
            _end: Option<chrono::DateTime<Utc>>,
        ) -> Box<dyn Iterator<Item = crate::data_source::BarResult> + '_> {
            Box::new(std::iter::once(Err(DataSourceError::Io("boom".into()))))
        }
        fn read_last_data(&self, _symbol: &str) -> Result<Bar, DataSourceError> {
            Err(DataSourceError::Io("no data".into()))
        }
    }

    #[test]
    fn data_read_error_propagates_as_fatal() {
        let mut strategy = ScriptedStrategy::new(vec![], ENGINE_VERSION);
        let mut source = FailingDataSource;
        let config = sample_config();
        let dir = tempdir();
        let mut callbacks = NullCallbacks;

        let result = SimulationDriver::run(
            &mut strategy,
            &mut source,
            &config,
            "initial_capital: 100000",
            "run-1",
            "strategy.wasm",
            "data.parquet",
            dir.path(),
            &CancellationToken::new(),
            &mut callbacks,
        );

        assert!(matches!(result, Err(DriverError::Data(_))));
    }

    #[test]
    fn strategy_places_orders_through_host_api() {
        struct OrderingStrategy {
            api: Option<HostApi>,
        }
        impl Strategy for OrderingStrategy {
            fn initialize_api(&mut self, api: HostApi) -> Result<(), StrategyError> {
                self.api = Some(api);
                Ok(())
            }
            fn initialize(&mut self, _config_text: &str) -> Result<(), StrategyError> {
                Ok(())
            }
            fn process_data(&mut self, bar: &Bar) -> Result<(), StrategyError> {
                let api = self.api.as_ref().unwrap();
                let order = ExecuteOrder::market(
                    bar.symbol.clone(),
                    OrderSide::Buy,
                    PositionType::Long,
                    dec!(1),
                    "ordering",
                    "buy every bar",
                );
                let mut order = order;
                order.price = dec!(1);
                api.place_order(order)
                    .map_err(|e| StrategyError::Other(e.to_string()))
            }
            fn name(&self) -> &str {
                "ordering"
            }
            fn get_runtime_engine_version(&self) -> Result<String, StrategyError> {
                Ok(ENGINE_VERSION.to_string())
            }
            fn get_identifier(&self) -> Result<String, StrategyError> {
                Ok("ordering-1".to_string())
            }
        }

        let mut strategy = OrderingStrategy { api: None };
        let mut source = InMemoryDataSource::new(vec![bar("AAPL", dec!(105), dec!(95), 0)]);
        let config = sample_config();
        let dir = tempdir();
        let mut callbacks = NullCallbacks;

        let outcome = SimulationDriver::run(
            &mut strategy,
            &mut source,
            &config,
            "initial_capital: 100000",
            "run-1",
            "strategy.wasm",
            "data.parquet",
            dir.path(),
            &CancellationToken::new(),
            &mut callbacks,
        )
        .unwrap();

        assert_eq!(outcome.engine.borrow().position("AAPL").total_long_qty(), dec!(1));
        assert!(dir.path().join("stats.yaml").exists());
        assert!(dir.path().join("state.db/orders.parquet").exists());
    }

    fn tempdir() -> TestDir {
        TestDir::new()
    }

    /// Minimal self-cleaning temp directory, avoiding a `tempfile`
    /// dev-dependency for what is otherwise a handful of driver tests.
    struct TestDir(std::path::PathBuf);
    impl TestDir {
        fn new() -> Self {
            let path = std::env::temp_dir().join(format!(
                "replay-core-test-{}-{}",
                std::process::id(),
                uuid::Uuid::new_v4()
            ));
            std::fs::create_dir_all(&path).unwrap();
            Self(path)
        }
        fn path(&self) -> &Path {
            &self.0
        }
    }
    impl Drop for TestDir {
        fn drop(&mut self) {
            let _ = std::fs::remove_dir_all(&self.0);
        }
    }
}
