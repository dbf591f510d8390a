use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use futures::StreamExt;
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use cozeflow_config::{Settings, WorkflowRequest};
use cozeflow_projection::project;
use cozeflow_relay::{ClientFrame, relay};
use cozeflow_tracker::{
  ChannelNotifier, ExecutionTracker, PollOutcome, TrackerEvent, TrackerState, evaluate,
  normalize_detail,
};
use cozeflow_upstream::{
  Credential, DrawClient, DrawRequest, PreparedRun, SpeechClient, SpeechRequest, TranslateClient,
  TranslateRequest, WorkflowClient, validate_translation_key,
};

/// Cozeflow - run subtitle video workflows and follow them to completion
#[derive(Parser)]
#[command(name = "cozeflow")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.cozeflow)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Settings file (default: <data-dir>/config.json)
  #[arg(long, global = true)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Args)]
struct WorkflowToken {
  /// Workflow service token
  #[arg(long, env = "COZE_API_TOKEN", hide_env_values = true)]
  token: String,
}

#[derive(Subcommand)]
enum Commands {
  /// Run a workflow with a request read from stdin
  Run {
    #[command(flatten)]
    auth: WorkflowToken,

    #[arg(long, value_enum, default_value_t = Mode::Stream)]
    mode: Mode,

    /// sse: raw frames (stream mode) or JSON (async mode)
    #[arg(long, value_enum, default_value_t = Format::Sse)]
    format: Format,

    /// Text document used as the input text
    #[arg(long)]
    input_file: Option<PathBuf>,
  },

  /// Query an asynchronous execution once
  Status {
    #[command(flatten)]
    auth: WorkflowToken,

    /// Workflow id (default: the configured one)
    #[arg(long)]
    workflow_id: Option<String>,

    #[arg(long)]
    execute_id: String,
  },

  /// Check a workflow token against the profile endpoint
  VerifyToken {
    #[command(flatten)]
    auth: WorkflowToken,
  },

  /// Translate a request read from stdin
  Translate {
    #[arg(long, env = "DEEPL_API_KEY", hide_env_values = true)]
    key: String,
  },

  /// Translate a fixed sentence to check a key
  TestTranslation {
    #[arg(long, env = "DEEPL_API_KEY", hide_env_values = true)]
    key: String,
  },

  /// Synthesize speech from a request read from stdin
  Speech {
    #[arg(long, env = "MINIMAX_API_KEY", hide_env_values = true)]
    key: String,
  },

  /// Synthesize a fixed sample to check a key
  TestSpeech {
    #[arg(long, env = "MINIMAX_API_KEY", hide_env_values = true)]
    key: String,
  },

  /// Submit a draw task read from stdin
  Draw {
    #[arg(long, env = "CUMOB_API_KEY", hide_env_values = true)]
    key: String,
  },

  /// Fetch the state of a draw task
  DrawResult {
    #[arg(long, env = "CUMOB_API_KEY", hide_env_values = true)]
    key: String,

    #[arg(long)]
    id: String,
  },

  /// Submit a minimal draw task to check a key
  TestDraw {
    #[arg(long, env = "CUMOB_API_KEY", hide_env_values = true)]
    key: String,
  },
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
  /// Relay the streaming run as it happens
  Stream,
  /// Submit, then poll until the run finishes
  Async,
}

#[derive(Clone, Copy, ValueEnum)]
enum Format {
  Sse,
  Text,
}

fn main() -> Result<()> {
  init_tracing();

  let cli = Cli::parse();

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".cozeflow"),
  };
  let settings = load_settings(cli.config.as_deref(), &data_dir)?;
  debug!(
    data_dir = %data_dir.display(),
    poll_interval_ms = settings.poll_interval_ms,
    "settings_loaded"
  );

  match cli.command {
    Some(command) => {
      let rt = tokio::runtime::Runtime::new()?;
      rt.block_on(dispatch(command, settings))
    }
    None => {
      println!("cozeflow - use --help to see available commands");
      Ok(())
    }
  }
}

fn init_tracing() {
  let filter = EnvFilter::try_from_env("COZEFLOW_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(io::stderr)
    .init();
}

fn load_settings(explicit: Option<&Path>, data_dir: &Path) -> Result<Settings> {
  match explicit {
    Some(path) => Settings::from_file(path)
      .with_context(|| format!("failed to load settings: {}", path.display())),
    None => {
      let path = data_dir.join("config.json");
      Settings::from_file_or_default(&path)
        .with_context(|| format!("failed to load settings: {}", path.display()))
    }
  }
}

async fn dispatch(command: Commands, settings: Settings) -> Result<()> {
  match command {
    Commands::Run {
      auth,
      mode,
      format,
      input_file,
    } => run_workflow(&settings, &auth.token, mode, format, input_file).await,
    Commands::Status {
      auth,
      workflow_id,
      execute_id,
    } => query_status(&settings, &auth.token, workflow_id, &execute_id).await,
    Commands::VerifyToken { auth } => {
      let client = WorkflowClient::new(&settings)?;
      let credential = Credential::parse(&auth.token)?;
      let profile = client
        .verify_token(&credential)
        .await
        .context("token verification failed")?;
      print_json(&profile)
    }
    Commands::Translate { key } => {
      let request: TranslateRequest = read_request_from_stdin()?;
      let response = TranslateClient::new(&settings)?
        .translate(&key, &request)
        .await
        .context("translation failed")?;
      print_json(&response)
    }
    Commands::TestTranslation { key } => {
      let response = TranslateClient::new(&settings)?
        .test_connection(&key)
        .await
        .context("translation test failed")?;
      print_json(&response)
    }
    Commands::Speech { key } => {
      let request: SpeechRequest = read_request_from_stdin()?;
      let response = SpeechClient::new(&settings)?
        .synthesize(&key, &request)
        .await
        .context("speech synthesis failed")?;
      print_json(&response)
    }
    Commands::TestSpeech { key } => {
      let response = SpeechClient::new(&settings)?
        .test_connection(&key)
        .await
        .context("speech test failed")?;
      print_json(&response)
    }
    Commands::Draw { key } => {
      let mut request: DrawRequest = read_request_from_stdin()?;
      if request.model.is_empty() {
        request.model = settings.defaults.draw_model.clone();
      }
      let response = DrawClient::new(&settings)?
        .draw(&key, &request)
        .await
        .context("draw request failed")?;
      if let Some(id) = response.task_id() {
        eprintln!("Draw task: {}", id);
      }
      print_json(&response)
    }
    Commands::DrawResult { key, id } => {
      let envelope = DrawClient::new(&settings)?
        .result(&key, &id)
        .await
        .context("draw result query failed")?;
      print_json(&envelope)
    }
    Commands::TestDraw { key } => {
      let response = DrawClient::new(&settings)?
        .test_connection(&key)
        .await
        .context("draw test failed")?;
      print_json(&response)
    }
  }
}

async fn run_workflow(
  settings: &Settings,
  token: &str,
  mode: Mode,
  format: Format,
  input_file: Option<PathBuf>,
) -> Result<()> {
  let mut request: WorkflowRequest = read_request_from_stdin()?;

  if let Some(path) = input_file {
    let text = tokio::fs::read_to_string(&path)
      .await
      .with_context(|| format!("failed to read input file: {}", path.display()))?;
    request.input_text = Some(text);
  }

  // The translation key is optional, but a supplied one must be well formed.
  if let Some(key) = request.deepl_api.as_deref().filter(|k| !k.is_empty()) {
    validate_translation_key(key)?;
  }

  let client = WorkflowClient::new(settings)?;
  let run = client.prepare(&request, token)?;
  eprintln!("Workflow: {}", run.workflow_id());

  match mode {
    Mode::Stream => stream_run(&client, run, format).await,
    Mode::Async => track_run(client, run, settings, format).await,
  }
}

async fn stream_run(client: &WorkflowClient, run: PreparedRun, format: Format) -> Result<()> {
  let body = client
    .stream_run(&run)
    .await
    .context("failed to start streaming run")?;

  let frames = relay(body);
  futures::pin_mut!(frames);

  let mut stdout = io::stdout().lock();
  while let Some(frame) = frames.next().await {
    match (format, &frame) {
      (Format::Sse, _) => write!(stdout, "{}", frame.to_sse())?,
      (Format::Text, ClientFrame::Frame(frame)) => writeln!(stdout, "{}", frame.display_text())?,
      (Format::Text, ClientFrame::Terminator) => {}
    }
    stdout.flush()?;
  }

  Ok(())
}

async fn track_run(
  client: WorkflowClient,
  run: PreparedRun,
  settings: &Settings,
  format: Format,
) -> Result<()> {
  let (sender, mut events) = mpsc::unbounded_channel();
  let tracker =
    ExecutionTracker::with_notifier(client, ChannelNotifier::new(sender), settings.poll_interval());
  tracker.start(run);

  let settled = tracker.wait_terminal();
  tokio::pin!(settled);
  let interrupted = tokio::signal::ctrl_c();
  tokio::pin!(interrupted);

  let state = loop {
    tokio::select! {
      state = &mut settled => break state,
      Some(event) = events.recv() => report_event(&event),
      _ = &mut interrupted => {
        eprintln!("Interrupted, cancelling");
        tracker.cancel();
        break tracker.state();
      }
    }
  };

  while let Ok(event) = events.try_recv() {
    report_event(&event);
  }

  match state {
    TrackerState::Completed { projection, .. } => {
      let result = project(&projection.execute_status, projection.output.as_ref());
      match format {
        Format::Sse => print_json(&result)?,
        Format::Text => print!("{}", result.render_text()),
      }
      Ok(())
    }
    TrackerState::Failed { failure, .. } => {
      if let Some(logid) = &failure.logid {
        eprintln!("logid: {}", logid);
      }
      if let Some(debug_url) = &failure.debug_url {
        eprintln!("debug: {}", debug_url);
      }
      bail!("execution failed: {}", failure.message)
    }
    TrackerState::Cancelled { .. } | TrackerState::Idle => {
      eprintln!("Execution cancelled");
      Ok(())
    }
    other => bail!("tracker stopped in unexpected state: {}", other.name()),
  }
}

fn report_event(event: &TrackerEvent) {
  match event {
    TrackerEvent::Submitted {
      execute_id,
      debug_url,
      ..
    } => {
      eprintln!("Submitted: {}", execute_id);
      if let Some(debug_url) = debug_url {
        eprintln!("Debug: {}", debug_url);
      }
    }
    TrackerEvent::Polled {
      attempt, status, ..
    } => eprintln!("Poll {}: {}", attempt, status),
    TrackerEvent::Completed { projection, .. } => {
      eprintln!("Finished: {}", projection.execute_status)
    }
    TrackerEvent::Failed { failure, .. } => eprintln!("Failed: {}", failure.message),
    TrackerEvent::Cancelled { .. } => {}
  }
}

async fn query_status(
  settings: &Settings,
  token: &str,
  workflow_id: Option<String>,
  execute_id: &str,
) -> Result<()> {
  let client = WorkflowClient::new(settings)?;
  let credential = Credential::parse(token)?;
  let workflow_id = workflow_id.unwrap_or_else(|| settings.defaults.workflow_id.clone());

  let envelope = client
    .run_history(&credential, &workflow_id, execute_id)
    .await
    .context("status query failed")?;

  match evaluate(&envelope) {
    PollOutcome::Pending { status } => {
      println!("status: {}", status);
      Ok(())
    }
    PollOutcome::Finished { detail } => {
      let projection = detail.projection();
      print_json(&detail)?;
      print!(
        "{}",
        project(&projection.execute_status, projection.output.as_ref()).render_text()
      );
      Ok(())
    }
    PollOutcome::Rejected { failure } => {
      // Show whatever detail came along with the rejection.
      if let Ok(detail) = normalize_detail(envelope.data.as_ref()) {
        print_json(&detail)?;
      }
      bail!("status query rejected: {}", failure.message)
    }
  }
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn read_request_from_stdin<T: DeserializeOwned>() -> Result<T> {
  use std::io::IsTerminal;

  let payload = if io::stdin().is_terminal() {
    // No stdin pipe, use empty object
    serde_json::json!({})
  } else {
    let mut input = String::new();
    io::stdin()
      .read_to_string(&mut input)
      .context("failed to read request from stdin")?;

    if input.trim().is_empty() {
      serde_json::json!({})
    } else {
      serde_json::from_str(&input).context("failed to parse request JSON from stdin")?
    }
  };

  serde_json::from_value(payload).context("request JSON does not match the expected shape")
}
