use std::collections::HashMap;
use std::env;
use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use clap::{Parser, Subcommand};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, GenericImageView, Rgba, RgbaImage};
use spark_contracts::chat::{parse_command, CHAT_HELP_COMMANDS};
use spark_contracts::conversation::{
    parse_data_url, AspectRatio, Attachment, ImageStyle, Message, MessageKind, Mode, SendRequest,
};
use spark_engine::{
    DryrunService, GeminiService, GenerativeService, Orchestrator, SendOutcome, SparkConfig,
};

#[derive(Debug, Parser)]
#[command(name = "spark", version, about = "Spark AI terminal client")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    Chat(ChatArgs),
    Run(RunArgs),
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    image_model: Option<String>,
    #[arg(long)]
    image_fallback_model: Option<String>,
    #[arg(long)]
    dryrun: bool,
}

#[derive(Debug, Parser)]
struct RunArgs {
    #[arg(long)]
    prompt: String,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    #[arg(long, default_value = "chat")]
    mode: String,
    #[arg(long)]
    ratio: Option<String>,
    #[arg(long)]
    style: Option<String>,
    #[arg(long)]
    attach: Vec<PathBuf>,
    #[arg(long)]
    model: Option<String>,
    #[arg(long)]
    image_model: Option<String>,
    #[arg(long)]
    image_fallback_model: Option<String>,
    #[arg(long)]
    dryrun: bool,
}

/// Model choices given on the command line; they win over the environment.
#[derive(Debug, Default)]
struct ModelOverrides {
    chat: Option<String>,
    image: Option<String>,
    image_fallback: Option<String>,
}

const ATTACHMENT_MAX_DIM: u32 = 1536;

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("spark error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Chat(args) => {
            run_chat(args)?;
            Ok(0)
        }
        Command::Run(args) => run_once(args),
    }
}

fn run_chat(args: ChatArgs) -> Result<()> {
    let overrides = ModelOverrides {
        chat: args.model.clone(),
        image: args.image_model.clone(),
        image_fallback: args.image_fallback_model.clone(),
    };
    let mut orchestrator =
        build_orchestrator(&args.out, args.events.as_deref(), overrides, args.dryrun)?;
    let mut attachment_seq = 0usize;

    println!(
        "Spark chat started ({} service, model {}). Type /help for commands.",
        orchestrator.service_name(),
        orchestrator.chat_model()
    );
    let welcome_id = orchestrator.greet();
    if let Some(message) = orchestrator.conversation().get(&welcome_id) {
        print_message(message, None);
    }

    loop {
        let composer = orchestrator.composer();
        let Some(input) = prompt_line(&format!(
            "[{} {}{}] > ",
            composer.mode(),
            composer.aspect_ratio().as_str(),
            attachment_badge(composer.attachments().len())
        ))?
        else {
            break;
        };

        let command = parse_command(&input);
        match command.action.as_str() {
            "noop" => continue,
            "help" => {
                println!("Commands: {}", CHAT_HELP_COMMANDS.join(" "));
            }
            "quit" => break,
            "set_mode" => match command.arg_str("mode").and_then(Mode::parse) {
                Some(mode) => {
                    orchestrator.composer_mut().set_mode(mode);
                    println!("Mode set to {mode}");
                }
                None => println!(
                    "/mode requires one of: {}",
                    Mode::ALL.map(Mode::as_str).join(", ")
                ),
            },
            "set_model" => {
                let Some(requested) = command.arg_str("model") else {
                    println!("Chat model: {}", orchestrator.chat_model());
                    continue;
                };
                let previous = orchestrator.chat_model().to_string();
                match orchestrator.select_model(requested) {
                    Ok(selection) => {
                        if let Some(reason) = selection.fallback_reason.as_deref() {
                            println!("{reason}");
                        }
                        println!("Chat model set to {}", selection.model.name);
                    }
                    Err(err) => println!(
                        "{}",
                        model_change_failure(&previous, orchestrator.chat_model(), &err)
                    ),
                }
            }
            "list_models" => {
                for model in orchestrator.available_models() {
                    let marker = if model.name == orchestrator.chat_model() {
                        "*"
                    } else {
                        " "
                    };
                    println!("{marker} {} ({})", model.name, model.label);
                }
            }
            "set_ratio" => match command.arg_str("ratio").and_then(AspectRatio::parse) {
                Some(ratio) => {
                    orchestrator.composer_mut().set_aspect_ratio(ratio);
                    println!("Aspect ratio set to {} ({})", ratio.as_str(), ratio.label());
                }
                None => println!("/ratio requires one of: {}", ratio_choices()),
            },
            "set_style" => match command.arg_str("style").and_then(ImageStyle::parse) {
                Some(style) => {
                    orchestrator.composer_mut().set_style(style);
                    println!("Style set to {}", style.label());
                }
                None => println!("/style requires a known style (see /styles)"),
            },
            "list_styles" => {
                let active = orchestrator.composer().style();
                for style in ImageStyle::ALL {
                    let marker = if style == active { "*" } else { " " };
                    println!("{marker} {} ({})", style.key(), style.label());
                }
            }
            "attach" => {
                let paths = command.arg_list("paths");
                if paths.is_empty() {
                    println!("/attach requires at least one path");
                    continue;
                }
                for path in paths {
                    attachment_seq += 1;
                    let id = format!("att{attachment_seq}");
                    match load_attachment(Path::new(&path), &id) {
                        Ok(attachment) => {
                            println!("Attached {path} as {id} ({})", attachment.mime_type);
                            orchestrator.composer_mut().add_attachment(attachment);
                        }
                        Err(err) => println!("Attach failed: {err:#}"),
                    }
                }
            }
            "detach" => {
                let Some(id) = command.arg_str("id") else {
                    println!("/detach requires an attachment id");
                    continue;
                };
                if orchestrator.composer_mut().remove_attachment(id) {
                    println!("Detached {id}");
                } else {
                    println!("No attachment with id {id}");
                }
            }
            "reuse" => {
                if orchestrator.reuse_image(command.arg_str("id")) {
                    println!(
                        "Image reused as reference. Composer: \"{}\" (/send to use it, or type your own instruction)",
                        orchestrator.composer().text()
                    );
                } else {
                    println!("No generated image to reuse");
                }
            }
            "export" => {
                let path = command
                    .arg_str("path")
                    .map(PathBuf::from)
                    .unwrap_or_else(|| args.out.join("transcript.json"));
                match orchestrator.conversation().save(&path) {
                    Ok(()) => println!("Exported to {}", path.display()),
                    Err(err) => println!("Export failed: {err:#}"),
                }
            }
            "send" => {
                let text = command.text.clone().unwrap_or_default();
                orchestrator.composer_mut().set_text(text);
                let outcome = orchestrator.send();
                handle_chat_outcome(&mut orchestrator, &args.out, outcome)?;
            }
            "send_composer" => {
                let outcome = orchestrator.send();
                handle_chat_outcome(&mut orchestrator, &args.out, outcome)?;
            }
            _ => {
                println!(
                    "Unknown command: {}. Type /help for commands.",
                    command.raw.trim()
                );
            }
        }
    }

    Ok(())
}

fn handle_chat_outcome(
    orchestrator: &mut Orchestrator,
    out_dir: &Path,
    outcome: SendOutcome,
) -> Result<()> {
    let outcome = match outcome {
        SendOutcome::Intercepted => {
            println!(
                "That sounds like an image request. Pick an aspect ratio ({}) or press Enter to cancel.",
                ratio_choices()
            );
            let answer = prompt_line("ratio> ")?.unwrap_or_default();
            match AspectRatio::parse(&answer) {
                Some(ratio) => match orchestrator.confirm_ratio(ratio) {
                    Some(outcome) => outcome,
                    None => return Ok(()),
                },
                None => {
                    orchestrator.cancel_ratio();
                    println!("Image generation cancelled.");
                    return Ok(());
                }
            }
        }
        other => other,
    };
    report_outcome(orchestrator, out_dir, &outcome)?;
    Ok(())
}

fn run_once(args: RunArgs) -> Result<i32> {
    let mode =
        Mode::parse(&args.mode).ok_or_else(|| anyhow!("unknown mode '{}'", args.mode))?;
    let ratio = args
        .ratio
        .as_deref()
        .map(|raw| AspectRatio::parse(raw).ok_or_else(|| anyhow!("unknown aspect ratio '{raw}'")))
        .transpose()?;
    let style = args
        .style
        .as_deref()
        .map(|raw| ImageStyle::parse(raw).ok_or_else(|| anyhow!("unknown style '{raw}'")))
        .transpose()?
        .unwrap_or_default();
    let attachments = args
        .attach
        .iter()
        .enumerate()
        .map(|(idx, path)| load_attachment(path, &format!("att{}", idx + 1)))
        .collect::<Result<Vec<Attachment>>>()?;

    let overrides = ModelOverrides {
        chat: args.model.clone(),
        image: args.image_model.clone(),
        image_fallback: args.image_fallback_model.clone(),
    };
    let mut orchestrator =
        build_orchestrator(&args.out, args.events.as_deref(), overrides, args.dryrun)?;
    orchestrator.composer_mut().set_style(style);

    let mut request = SendRequest::new(args.prompt.clone(), mode)
        .with_style(style)
        .with_attachments(attachments);
    if let Some(ratio) = ratio {
        request = request.with_aspect_ratio(ratio);
    }

    let outcome = match orchestrator.handle_send(request) {
        SendOutcome::Intercepted => {
            let Some(ratio) = ratio else {
                orchestrator.cancel_ratio();
                eprintln!("spark: image request detected; pass --ratio to generate it");
                return Ok(2);
            };
            orchestrator
                .confirm_ratio(ratio)
                .ok_or_else(|| anyhow!("intercepted prompt was lost before confirmation"))?
        }
        other => other,
    };
    let kind = report_outcome(&orchestrator, &args.out, &outcome)?;
    orchestrator
        .conversation()
        .save(&args.out.join("transcript.json"))?;
    Ok(match kind {
        Some(MessageKind::Error) => 1,
        Some(_) => 0,
        None => 2,
    })
}

fn build_orchestrator(
    out_dir: &Path,
    events: Option<&Path>,
    overrides: ModelOverrides,
    dryrun: bool,
) -> Result<Orchestrator> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let dotenv = parse_dotenv(Path::new(".env"));
    let config = apply_overrides(
        SparkConfig::from_lookup(|key| env::var(key).ok().or_else(|| dotenv.get(key).cloned())),
        overrides,
    );
    let service: Box<dyn GenerativeService> = if dryrun {
        Box::new(DryrunService::new())
    } else if !config.has_api_key() {
        eprintln!("spark warning: GEMINI_API_KEY or GOOGLE_API_KEY or API_KEY not set; using dryrun service");
        Box::new(DryrunService::new())
    } else {
        Box::new(GeminiService::new(&config)?)
    };
    let events_path = events
        .map(Path::to_path_buf)
        .unwrap_or_else(|| out_dir.join("events.jsonl"));
    Orchestrator::new(service, config, events_path)
}

fn apply_overrides(mut config: SparkConfig, overrides: ModelOverrides) -> SparkConfig {
    let pick = |value: Option<String>| value.filter(|value| !value.trim().is_empty());
    if let Some(model) = pick(overrides.chat) {
        config.chat_model = model;
    }
    if let Some(model) = pick(overrides.image) {
        config.image_model = model;
    }
    if let Some(model) = pick(overrides.image_fallback) {
        config.image_fallback_model = model;
    }
    config
}

/// Prints the result of a completed send. Returns the message kind, or `None`
/// when the send produced no message. An image that cannot be written to
/// `out_dir` is reported and printed without a path.
fn report_outcome(
    orchestrator: &Orchestrator,
    out_dir: &Path,
    outcome: &SendOutcome,
) -> Result<Option<MessageKind>> {
    let SendOutcome::Completed { message_id, kind } = outcome else {
        return Ok(None);
    };
    let Some(message) = orchestrator.conversation().get(message_id) else {
        bail!("message {message_id} missing from conversation");
    };
    let image_path = if message.is_image() {
        match save_image(message, out_dir) {
            Ok(path) => Some(path),
            Err(err) => {
                eprintln!("spark warning: could not save image: {err:#}");
                None
            }
        }
    } else {
        None
    };
    print_message(message, image_path.as_deref());
    Ok(Some(*kind))
}

/// A failed rebind still leaves the new model active, so say which model the
/// next message will use.
fn model_change_failure(previous: &str, current: &str, err: &anyhow::Error) -> String {
    if previous == current {
        return format!("Model change failed: {err:#}");
    }
    format!(
        "Chat model set to {current}, but its session could not start: {err:#}\nThe session will be retried on your next message."
    )
}

fn print_message(message: &Message, image_path: Option<&Path>) {
    match message.kind {
        MessageKind::Text => {
            println!("{}", message.content);
            let citations = message.citations();
            if !citations.is_empty() {
                println!("Sources:");
                for citation in citations {
                    let title = if citation.title.trim().is_empty() {
                        citation.uri.as_str()
                    } else {
                        citation.title.as_str()
                    };
                    println!("  - {title} <{}>", citation.uri);
                }
            }
        }
        MessageKind::Image => {
            let ratio = message
                .aspect_ratio()
                .map(AspectRatio::as_str)
                .unwrap_or("1:1");
            match image_path {
                Some(path) => println!("[image {} {ratio}] {}", message.id, path.display()),
                None => println!("[image {} {ratio}]", message.id),
            }
        }
        MessageKind::Error => println!("Error: {}", message.content),
    }
}

fn save_image(message: &Message, out_dir: &Path) -> Result<PathBuf> {
    let (mime_type, data) = parse_data_url(&message.content)
        .ok_or_else(|| anyhow!("message {} is not an image data URL", message.id))?;
    let bytes = BASE64
        .decode(data.as_bytes())
        .with_context(|| format!("message {} has invalid base64 image data", message.id))?;
    let path = out_dir.join(format!(
        "image-{}.{}",
        message.id,
        extension_for_mime(&mime_type)
    ));
    fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

fn extension_for_mime(mime_type: &str) -> &'static str {
    match mime_type.trim().to_ascii_lowercase().as_str() {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "image/heic" => "heic",
        _ => "png",
    }
}

fn load_attachment(path: &Path, id: &str) -> Result<Attachment> {
    let (bytes, mime_type) = prepare_attachment_image(path, ATTACHMENT_MAX_DIM)?;
    Ok(Attachment::new(id, mime_type, BASE64.encode(bytes)))
}

/// Decodable images are flattened onto white, shrunk to fit `max_dim` and
/// re-encoded as JPEG. Anything else is sent as the raw file bytes.
fn prepare_attachment_image(path: &Path, max_dim: u32) -> Result<(Vec<u8>, String)> {
    if let Ok(image) = image::open(path) {
        let rgba = image.to_rgba8();
        let mut flattened = RgbaImage::new(rgba.width(), rgba.height());
        for (x, y, pixel) in rgba.enumerate_pixels() {
            let alpha = u16::from(pixel[3]);
            let blend = |channel: u8| -> u8 {
                (((u16::from(channel) * alpha) + (255 * (255 - alpha))) / 255) as u8
            };
            flattened.put_pixel(
                x,
                y,
                Rgba([blend(pixel[0]), blend(pixel[1]), blend(pixel[2]), 255]),
            );
        }
        let mut flattened = DynamicImage::ImageRgba8(flattened);
        let (width, height) = flattened.dimensions();
        if width.max(height) > max_dim {
            flattened = flattened.resize(max_dim, max_dim, FilterType::Triangle);
        }
        let mut bytes = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut bytes, 90);
        if encoder
            .encode_image(&DynamicImage::ImageRgb8(flattened.to_rgb8()))
            .is_ok()
        {
            return Ok((bytes, "image/jpeg".to_string()));
        }
    }

    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    Ok((bytes, guess_image_mime(path).to_string()))
}

fn guess_image_mime(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|value| value.to_str())
        .map(|value| value.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        "gif" => "image/gif",
        "heic" | "heif" => "image/heic",
        _ => "image/png",
    }
}

fn parse_dotenv(path: &Path) -> HashMap<String, String> {
    let content = fs::read_to_string(path).unwrap_or_default();
    let mut vars = HashMap::new();
    for raw_line in content.lines() {
        let mut line = raw_line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(stripped) = line.strip_prefix("export ") {
            line = stripped.trim();
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        if key.is_empty() {
            continue;
        }
        let value = value.trim();
        let unquoted = [('"', '"'), ('\'', '\'')]
            .iter()
            .find_map(|(open, close)| {
                value
                    .strip_prefix(*open)
                    .and_then(|rest| rest.strip_suffix(*close))
            })
            .unwrap_or(value);
        vars.insert(key.to_string(), unquoted.to_string());
    }
    vars
}

fn prompt_line(prompt: &str) -> Result<Option<String>> {
    let stdin = io::stdin();
    let mut line = String::new();
    loop {
        print!("{prompt}");
        io::stdout().flush()?;
        line.clear();
        match stdin.read_line(&mut line) {
            Ok(0) => return Ok(None),
            Ok(_) => return Ok(Some(line.trim_end_matches(['\n', '\r']).to_string())),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(err.into()),
        }
    }
}

fn ratio_choices() -> String {
    AspectRatio::ALL
        .iter()
        .map(|ratio| ratio.as_str())
        .collect::<Vec<&str>>()
        .join(", ")
}

fn attachment_badge(count: usize) -> String {
    match count {
        0 => String::new(),
        1 => " +1 image".to_string(),
        n => format!(" +{n} images"),
    }
}
