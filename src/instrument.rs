//! Optional instrumentation around the measured section.
//!
//! A [`TraceSink`] is installed once, as a `tracing-subscriber` layer, when
//! logging is set up. It discards everything until a [`TraceSession`] points
//! it at a file; from then until the session stops, every span and event is
//! written to that file as one JSON object per line. The worker spans of the
//! executors show up there, one `new`/`close` pair per worker per run.
//!
//! With the `profiling` feature a [`ProfileSession`] samples the process with
//! `pprof` and writes a flamegraph when stopped.
//!
//! Both sessions stop on drop, so the output files are released on every exit
//! path. Only an explicit `stop` reports errors.
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use parking_lot::Mutex;
use tracing::Subscriber;
use tracing_subscriber::{
    Layer,
    filter::filter_fn,
    fmt::{self, MakeWriter, format::FmtSpan},
    registry::LookupSpan,
};

use crate::{Error, Result, config::Config};

/// Switchable destination of the JSON trace layer.
#[derive(Clone, Debug, Default)]
pub struct TraceSink {
    inner: Arc<SinkInner>,
}

#[derive(Debug, Default)]
struct SinkInner {
    active: AtomicBool,
    file: Mutex<Option<BufWriter<File>>>,
    error: Mutex<Option<io::Error>>,
}

impl TraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    /// The layer to add to the subscriber. Records nothing while inactive.
    pub fn layer<S>(&self) -> impl Layer<S> + Send + Sync + 'static + use<S>
    where
        S: Subscriber + for<'a> LookupSpan<'a>,
    {
        let inner = Arc::clone(&self.inner);
        fmt::layer()
            .json()
            .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
            .with_thread_ids(true)
            .with_writer(self.clone())
            .with_filter(filter_fn(move |_| inner.active.load(Ordering::Acquire)))
    }
}

impl<'a> MakeWriter<'a> for TraceSink {
    type Writer = SinkWriter<'a>;

    fn make_writer(&'a self) -> Self::Writer {
        SinkWriter { inner: &self.inner }
    }
}

/// Handle given to the formatter for one record.
pub struct SinkWriter<'a> {
    inner: &'a SinkInner,
}

impl Write for SinkWriter<'_> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut file = self.inner.file.lock();
        if let Some(w) = file.as_mut() {
            if let Err(e) = w.write_all(buf) {
                // first failure wins, surfaced by TraceSession::stop
                self.inner.error.lock().get_or_insert(e);
            }
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Routes the sink into `path` until stopped.
#[derive(Debug)]
pub struct TraceSession {
    sink: TraceSink,
    path: PathBuf,
    stopped: bool,
}

impl TraceSession {
    /// Creates (or truncates) `path` and activates the sink.
    pub fn start(sink: &TraceSink, path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|source| Error::Instrumentation {
            what: "creating trace file",
            path: path.to_path_buf(),
            source,
        })?;
        *sink.inner.file.lock() = Some(BufWriter::new(file));
        sink.inner.error.lock().take();
        sink.inner.active.store(true, Ordering::Release);

        tracing::debug!("Trace session started: {}", path.display());
        Ok(Self {
            sink: sink.clone(),
            path: path.to_path_buf(),
            stopped: false,
        })
    }

    /// Deactivates the sink, flushes and closes the file.
    pub fn stop(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        if self.stopped {
            return Ok(());
        }
        self.stopped = true;
        self.sink.inner.active.store(false, Ordering::Release);

        let writer = self.sink.inner.file.lock().take();
        let failed = self.sink.inner.error.lock().take();
        if let Some(source) = failed {
            return Err(Error::Instrumentation {
                what: "writing trace file",
                path: self.path.clone(),
                source,
            });
        }
        if let Some(mut writer) = writer {
            writer
                .flush()
                .and_then(|()| writer.get_ref().sync_all())
                .map_err(|source| Error::Instrumentation {
                    what: "closing trace file",
                    path: self.path.clone(),
                    source,
                })?;
        }
        tracing::debug!("Trace session stopped: {}", self.path.display());
        Ok(())
    }
}

impl Drop for TraceSession {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::warn!("{e}");
        }
    }
}

/// CPU sampling into a flamegraph.
#[cfg(feature = "profiling")]
pub struct ProfileSession {
    guard: Option<pprof::ProfilerGuard<'static>>,
    file: Option<File>,
    path: PathBuf,
}

#[cfg(feature = "profiling")]
impl ProfileSession {
    const FREQUENCY: i32 = 1000;

    /// Creates `path` and starts sampling.
    pub fn start(path: &Path) -> Result<Self> {
        let file = File::create(path).map_err(|source| Error::Instrumentation {
            what: "creating cpu profile",
            path: path.to_path_buf(),
            source,
        })?;
        let guard = pprof::ProfilerGuardBuilder::default()
            .frequency(Self::FREQUENCY)
            .blocklist(&["libc", "libgcc", "pthread", "vdso"])
            .build()?;
        tracing::debug!("CPU profile started: {}", path.display());
        Ok(Self {
            guard: Some(guard),
            file: Some(file),
            path: path.to_path_buf(),
        })
    }

    /// Stops sampling and writes the flamegraph.
    pub fn stop(mut self) -> Result<()> {
        self.finish()
    }

    fn finish(&mut self) -> Result<()> {
        let (Some(guard), Some(mut file)) = (self.guard.take(), self.file.take()) else {
            return Ok(());
        };
        let report = guard.report().build()?;
        drop(guard);
        report.flamegraph(&mut file)?;
        file.sync_all().map_err(|source| Error::Instrumentation {
            what: "closing cpu profile",
            path: self.path.clone(),
            source,
        })?;
        tracing::debug!("CPU profile written: {}", self.path.display());
        Ok(())
    }
}

#[cfg(feature = "profiling")]
impl Drop for ProfileSession {
    fn drop(&mut self) {
        if let Err(e) = self.finish() {
            tracing::warn!("{e}");
        }
    }
}

/// Everything requested by the configuration, started together.
#[derive(Default)]
pub struct Session {
    trace: Option<TraceSession>,
    #[cfg(feature = "profiling")]
    profile: Option<ProfileSession>,
}

impl Session {
    /// Starts the trace (if `config.trace` is set) and then the profile (if
    /// `config.cpu_profile` is set). A trace needs an installed `sink`.
    pub fn start(config: &Config, sink: Option<&TraceSink>) -> Result<Self> {
        let mut session = Session::default();
        if let Some(path) = &config.trace {
            let sink = sink.ok_or_else(|| {
                Error::InvalidConfig("trace requested but no trace layer is installed".to_string())
            })?;
            session.trace = Some(TraceSession::start(sink, path)?);
        }
        #[cfg(feature = "profiling")]
        if let Some(path) = &config.cpu_profile {
            session.profile = Some(ProfileSession::start(path)?);
        }
        Ok(session)
    }

    pub fn is_empty(&self) -> bool {
        #[cfg(feature = "profiling")]
        if self.profile.is_some() {
            return false;
        }
        self.trace.is_none()
    }

    /// Stops the trace, then the profile. Both are stopped even if the first
    /// fails; the first error is returned.
    pub fn stop(mut self) -> Result<()> {
        let trace = self.trace.take().map_or(Ok(()), TraceSession::stop);
        #[cfg(feature = "profiling")]
        let profile = self.profile.take().map_or(Ok(()), ProfileSession::stop);
        #[cfg(not(feature = "profiling"))]
        let profile = Ok(());
        trace.and(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing_subscriber::{Registry, layer::SubscriberExt};

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("parloop-{}-{name}", std::process::id()))
    }

    fn json_lines(path: &Path) -> Vec<serde_json::Value> {
        std::fs::read_to_string(path)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect()
    }

    #[test]
    fn inactive_sink_discards() {
        let sink = TraceSink::new();
        let mut w = sink.make_writer();
        assert_eq!(w.write(b"ignored").unwrap(), 7);
        assert!(!sink.is_active());
    }

    #[test]
    fn session_captures_only_while_active() {
        let sink = TraceSink::new();
        let subscriber = Registry::default().with(sink.layer());
        let path = temp_path("capture.json");

        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("before");
            let session = TraceSession::start(&sink, &path).unwrap();
            assert!(sink.is_active());
            tracing::info!(answer = 42, "during");
            tracing::trace_span!("worker", id = 3).in_scope(|| {});
            session.stop().unwrap();
            tracing::info!("after");
        });
        assert!(!sink.is_active());

        let lines = json_lines(&path);
        let messages: Vec<_> = lines
            .iter()
            .filter_map(|l| l["fields"]["message"].as_str())
            .collect();
        assert!(messages.contains(&"during"));
        assert!(!messages.contains(&"before"));
        assert!(!messages.contains(&"after"));
        assert!(lines.iter().any(|l| l["span"]["name"] == "worker"));
        let during = lines
            .iter()
            .find(|l| l["fields"]["message"] == "during")
            .unwrap();
        assert_eq!(during["fields"]["answer"], 42);

        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn drop_stops_session() {
        let sink = TraceSink::new();
        let path = temp_path("drop.json");
        {
            let _session = TraceSession::start(&sink, &path).unwrap();
            assert!(sink.is_active());
        }
        assert!(!sink.is_active());
        assert!(sink.inner.file.lock().is_none());
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn unwritable_path_is_an_error() {
        let sink = TraceSink::new();
        let path = temp_path("missing-dir").join("trace.json");
        let err = TraceSession::start(&sink, &path).unwrap_err();
        assert!(matches!(err, Error::Instrumentation { .. }));
        assert!(!sink.is_active());
    }

    #[test]
    fn trace_without_sink_is_rejected() {
        let config = Config::builder()
            .trace(Some(temp_path("nosink.json")))
            .build();
        let err = Session::start(&config, None).err().unwrap();
        assert!(matches!(err, Error::InvalidConfig(_)));
    }

    #[test]
    fn empty_session() {
        let session = Session::start(&Config::default(), None).unwrap();
        assert!(session.is_empty());
        session.stop().unwrap();
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn write_failure_is_reported_on_stop() {
        let sink = TraceSink::new();
        let subscriber = Registry::default().with(sink.layer());

        let err = tracing::subscriber::with_default(subscriber, || {
            let session = TraceSession::start(&sink, Path::new("/dev/full")).unwrap();
            // more than one buffer's worth, so the device is actually written
            for i in 0..2_000 {
                tracing::info!(i, "filling the trace buffer");
            }
            session.stop().unwrap_err()
        });

        assert!(matches!(
            err,
            Error::Instrumentation {
                what: "writing trace file",
                ..
            }
        ));
        assert!(!sink.is_active());
        assert!(sink.inner.error.lock().is_none());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn flush_failure_is_reported_on_stop() {
        let sink = TraceSink::new();
        let subscriber = Registry::default().with(sink.layer());

        let err = tracing::subscriber::with_default(subscriber, || {
            let session = TraceSession::start(&sink, Path::new("/dev/full")).unwrap();
            tracing::info!("fits in the buffer");
            session.stop().unwrap_err()
        });
        assert!(matches!(err, Error::Instrumentation { .. }));
    }

    #[cfg(feature = "profiling")]
    mod profiling {
        use super::*;
        use parking_lot::Mutex;
        use std::time::{Duration, Instant};

        // pprof allows one running profiler per process
        static PROFILER: Mutex<()> = Mutex::new(());

        fn burn(ms: u64) {
            let start = Instant::now();
            let mut x = 0.5;
            while start.elapsed() < Duration::from_millis(ms) {
                x = std::hint::black_box(crate::kernel::normalized_sinc(x) + 0.5);
            }
        }

        #[test]
        fn writes_flamegraph() {
            let _serial = PROFILER.lock();
            let path = temp_path("profile.svg");

            let session = ProfileSession::start(&path).unwrap();
            burn(300);
            session.stop().unwrap();

            let svg = std::fs::read_to_string(&path).unwrap();
            assert!(svg.contains("<svg"));
            std::fs::remove_file(&path).unwrap();
        }

        #[test]
        fn unwritable_path_is_an_error() {
            let path = temp_path("missing-dir").join("profile.svg");
            let err = ProfileSession::start(&path).err().unwrap();
            assert!(matches!(
                err,
                Error::Instrumentation {
                    what: "creating cpu profile",
                    ..
                }
            ));
        }

        #[test]
        fn session_starts_trace_and_profile() {
            let _serial = PROFILER.lock();
            let sink = TraceSink::new();
            let trace = temp_path("both.json");
            let profile = temp_path("both.svg");
            let config = Config::builder()
                .trace(Some(trace.clone()))
                .cpu_profile(Some(profile.clone()))
                .build();

            let session = Session::start(&config, Some(&sink)).unwrap();
            assert!(!session.is_empty());
            assert!(sink.is_active());
            burn(300);
            session.stop().unwrap();

            assert!(!sink.is_active());
            assert!(trace.exists());
            assert!(!std::fs::read(&profile).unwrap().is_empty());
            std::fs::remove_file(&trace).unwrap();
            std::fs::remove_file(&profile).unwrap();
        }
    }
}
