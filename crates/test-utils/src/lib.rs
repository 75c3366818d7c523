use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tagstream::{ExitReport, ProcessError, ToolLauncher, ToolOutput, ToolProcess};
use tokio::io::AsyncWriteExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

// --- Canned Catalogs ---

/// The single-table, single-tag catalog from the wire-format example.
pub const SCENARIO_CATALOG: &str = r#"<?xml version='1.0' encoding='UTF-8'?>
<taginfo>
<table name='EXIF' g0='Image' g1='IFD0' g2='Image'>
 <tag id='256' name='Width' type='int16u' writable='true'>
  <desc lang='en'>Image width</desc>
 </tag>
</table>
</taginfo>
"#;

/// A catalog shaped like real `-listx` output, with empty tables in between.
pub const SAMPLE_CATALOG: &str = r#"<?xml version='1.0' encoding='UTF-8'?>
<!-- Generated by ExifTool 12.76 -->
<taginfo>

<table name='Empty' g0='Other' g1='Other' g2='Other'>
 <desc lang='en'>Nothing here</desc>
</table>

<table name='EXIF::Main' g0='EXIF' g1='IFD0' g2='Image'>
 <desc lang='en'>Exif</desc>
 <tag id='11' name='ProcessingSoftware' type='string' writable='true' g1='IFD0' g2='Image'>
  <desc lang='en'>Processing Software</desc>
  <desc lang='de'>Verarbeitungssoftware</desc>
  <desc lang='fr'>Logiciel de traitement</desc>
 </tag>
 <tag id='254' name='SubfileType' type='int32u' writable='true' g1='IFD0' g2='Image'>
  <desc lang='en'>Subfile Type</desc>
  <values>
   <key id='0'><val lang='en'>Full-resolution image</val></key>
  </values>
 </tag>
 <tag id='256' name='ImageWidth' type='int32u' writable='true' g1='IFD0' g2='Image'>
  <desc lang='en'>Image Width</desc>
 </tag>
</table>

<table name='Composite' g0='Composite' g1='Composite' g2='Other'>
 <tag id='Aperture' name='Aperture' type='?' writable='false'>
  <desc lang='en'>Aperture</desc>
 </tag>
 <tag id='Opaque' name='Opaque' type='undef' writable='false'/>
</table>

<table name='Trailing' g0='Other'/>

</taginfo>
"#;

/// Paths in [`SAMPLE_CATALOG`], in document order.
pub const SAMPLE_PATHS: &[&str] = &[
    "EXIF::Main:ProcessingSoftware",
    "EXIF::Main:SubfileType",
    "EXIF::Main:ImageWidth",
    "Composite:Aperture",
    "Composite:Opaque",
];

/// A catalog whose first table carries a duplicated attribute.
pub const MALFORMED_TABLE_CATALOG: &str = r#"<?xml version='1.0' encoding='UTF-8'?>
<taginfo>
<table name='Broken' g0='Other'>
 <tag name='A' name='B' type='string' writable='true'/>
</table>
<table name='XMP::dc' g0='XMP'>
 <tag name='title' type='lang-alt' writable='true'>
  <desc lang='en'>Title</desc>
 </tag>
</table>
</taginfo>
"#;

/// A well-formed catalog with a nameless tag and a nameless table.
pub const NAMELESS_CATALOG: &str = r#"<?xml version='1.0' encoding='UTF-8'?>
<taginfo>
<table name='T' g0='G'>
 <tag name='A' type='string' writable='true'/>
 <tag type='string'/>
 <tag name='C' type='string'/>
</table>
<table g0='Other'>
 <tag name='D' type='int8u'>
  <desc lang='en'>  Padded text </desc>
 </tag>
</table>
</taginfo>
"#;

/// A catalog that breaks mid-stream with a mismatched end tag.
pub const BROKEN_STREAM_CATALOG: &str = r#"<?xml version='1.0' encoding='UTF-8'?>
<taginfo>
<table name='First' g0='Other'>
 <tag name='A' type='string' writable='true'/>
</table>
<table name='Second' g0='Other'>
 <tag name='B' type='string'></desc>
</table>
</taginfo>
"#;

/// Builds a catalog with `tables` tables of `tags_per_table` tags each.
pub fn generated_catalog(tables: usize, tags_per_table: usize) -> String {
    let mut xml = String::from("<?xml version='1.0' encoding='UTF-8'?>\n<taginfo>\n");
    for t in 0..tables {
        xml.push_str(&format!("<table name='T{t}' g0='G{t}'>\n"));
        for n in 0..tags_per_table {
            xml.push_str(&format!(
                " <tag name='Tag{n}' type='string' writable='true'><desc lang='en'>Tag {n} of table {t}</desc></tag>\n"
            ));
        }
        xml.push_str("</table>\n");
    }
    xml.push_str("</taginfo>\n");
    xml
}

// --- Logging ---

/// Installs a compact test subscriber; repeated calls are ignored.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .compact()
        .with_test_writer()
        .try_init();
}

// --- Scripted Tool Process ---

/// Observes what happened to the processes a [`ScriptedLauncher`] started.
#[derive(Debug, Clone, Default)]
pub struct ProcessProbe {
    inner: Arc<ProbeState>,
}

#[derive(Debug, Default)]
struct ProbeState {
    launches: AtomicUsize,
    killed: AtomicBool,
    reaped: AtomicBool,
}

impl ProcessProbe {
    pub fn launches(&self) -> usize {
        self.inner.launches.load(Ordering::SeqCst)
    }

    pub fn was_killed(&self) -> bool {
        self.inner.killed.load(Ordering::SeqCst)
    }

    pub fn was_reaped(&self) -> bool {
        self.inner.reaped.load(Ordering::SeqCst)
    }

    /// Polls until the last process has been reaped or the timeout elapses.
    pub async fn wait_until_reaped(&self, timeout: Duration) -> bool {
        let deadline = tokio::time::Instant::now() + timeout;
        while tokio::time::Instant::now() < deadline {
            if self.was_reaped() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        self.was_reaped()
    }
}

/// A [`ToolLauncher`] that replays canned output instead of running a binary.
#[derive(Debug, Clone)]
pub struct ScriptedLauncher {
    output: Vec<u8>,
    chunk_size: usize,
    chunk_delay: Duration,
    hold_open: bool,
    exit_code: i32,
    fail_launch: bool,
    with_stdout: bool,
    probe: ProcessProbe,
}

impl ScriptedLauncher {
    pub const PROGRAM: &'static str = "scripted-exiftool";

    pub fn new(output: impl Into<Vec<u8>>) -> Self {
        Self {
            output: output.into(),
            chunk_size: 256,
            chunk_delay: Duration::ZERO,
            hold_open: false,
            exit_code: 0,
            fail_launch: false,
            with_stdout: true,
            probe: ProcessProbe::default(),
        }
    }

    /// A launcher whose program cannot be found.
    pub fn failing() -> Self {
        Self {
            fail_launch: true,
            ..Self::new(Vec::new())
        }
    }

    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    pub fn chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Keeps stdout open after the output is written, like a tool still working.
    pub fn hold_open(mut self) -> Self {
        self.hold_open = true;
        self
    }

    pub fn exit_code(mut self, code: i32) -> Self {
        self.exit_code = code;
        self
    }

    pub fn without_stdout(mut self) -> Self {
        self.with_stdout = false;
        self
    }

    pub fn probe(&self) -> ProcessProbe {
        self.probe.clone()
    }
}

#[async_trait]
impl ToolLauncher for ScriptedLauncher {
    fn program(&self) -> &str {
        Self::PROGRAM
    }

    async fn launch(&self) -> Result<Box<dyn ToolProcess>, ProcessError> {
        if self.fail_launch {
            return Err(ProcessError::Spawn {
                program: Self::PROGRAM.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "No such file or directory"),
            });
        }
        self.probe.inner.launches.fetch_add(1, Ordering::SeqCst);
        self.probe.inner.killed.store(false, Ordering::SeqCst);
        self.probe.inner.reaped.store(false, Ordering::SeqCst);

        let (mut writer, reader) = tokio::io::duplex(64 * 1024);
        let kill = CancellationToken::new();
        let feeder_kill = kill.clone();
        let chunks: Vec<Vec<u8>> = self
            .output
            .chunks(self.chunk_size)
            .map(|c| c.to_vec())
            .collect();
        let delay = self.chunk_delay;
        let hold_open = self.hold_open;

        let feeder = tokio::spawn(async move {
            for chunk in chunks {
                if !delay.is_zero() {
                    tokio::select! {
                        _ = feeder_kill.cancelled() => return,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                tokio::select! {
                    _ = feeder_kill.cancelled() => return,
                    written = writer.write_all(&chunk) => if written.is_err() { return },
                }
            }
            if hold_open {
                feeder_kill.cancelled().await;
            }
        });

        Ok(Box::new(ScriptedProcess {
            stdout: self.with_stdout.then(|| Box::new(reader) as ToolOutput),
            feeder: Some(feeder),
            kill,
            exit_code: self.exit_code,
            probe: self.probe.clone(),
        }))
    }
}

struct ScriptedProcess {
    stdout: Option<ToolOutput>,
    feeder: Option<JoinHandle<()>>,
    kill: CancellationToken,
    exit_code: i32,
    probe: ProcessProbe,
}

#[async_trait]
impl ToolProcess for ScriptedProcess {
    fn take_stdout(&mut self) -> Option<ToolOutput> {
        self.stdout.take()
    }

    fn kill(&mut self) -> Result<(), ProcessError> {
        self.probe.inner.killed.store(true, Ordering::SeqCst);
        self.kill.cancel();
        Ok(())
    }

    async fn wait(&mut self) -> Result<ExitReport, ProcessError> {
        if let Some(feeder) = self.feeder.take() {
            let _ = feeder.await;
        }
        self.probe.inner.reaped.store(true, Ordering::SeqCst);
        if self.kill.is_cancelled() {
            Ok(ExitReport::signalled())
        } else {
            Ok(ExitReport::from_code(self.exit_code))
        }
    }
}
