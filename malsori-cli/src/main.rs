//! Malsori CLI - Korean pronunciation scoring from the command line
//!
//! Logs go to stderr; results go to stdout (as JSON with `--json`).

mod config;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use malsori_pron::g2p::{decompose, decompose_words, ipa_string};
use malsori_pron::{
    score_text, word_accuracy, CheckOutcome, Phoneme, PronunciationChecker, PronunciationResult,
    WordAccuracy,
};
use serde::Serialize;
use tracing::{info, warn, Level};

use crate::config::MalsoriConfig;

#[derive(Parser, Debug)]
#[command(name = "malsori", version, about = "Korean pronunciation scoring")]
struct Cli {
    /// Config file (default: platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score a recording against the sentence it should contain
    Check {
        /// Audio file (wav, mp3, flac, ogg, m4a, or raw 16-bit PCM)
        #[arg(long)]
        audio: PathBuf,

        /// Expected Korean sentence
        #[arg(long)]
        text: String,

        /// Format hint; defaults to the file extension
        #[arg(long)]
        format: Option<String>,

        /// Sample rate for headerless PCM
        #[arg(long, default_value_t = 16000)]
        sample_rate: u32,

        /// Speech-to-text transcript used for word accuracy when the model is unavailable
        #[arg(long)]
        transcript: Option<String>,

        #[arg(long)]
        json: bool,
    },

    /// Decompose Hangul text into jamo phonemes
    G2p {
        text: String,

        /// Also print the IPA rendering
        #[arg(long)]
        ipa: bool,

        #[arg(long)]
        json: bool,
    },

    /// Score a phoneme sequence against the expected text
    Score {
        /// Expected Korean sentence
        #[arg(long)]
        text: String,

        /// Recognised phonemes, e.g. "ㄱ ㅏ ㄴ"
        #[arg(long)]
        predicted: String,

        #[arg(long)]
        json: bool,
    },

    /// Word-level accuracy between two sentences
    WordAccuracy {
        #[arg(long)]
        expected: String,

        #[arg(long)]
        spoken: String,

        /// Count hesitation fillers as words
        #[arg(long)]
        keep_fillers: bool,

        #[arg(long)]
        json: bool,
    },

    /// Load the model and report what was found
    Status {
        #[arg(long)]
        json: bool,
    },
}

fn init_logging(verbose: u8, quiet: bool) {
    let level = match (quiet, verbose) {
        (true, _) => Level::ERROR,
        (false, 0) => Level::INFO,
        (false, 1) => Level::DEBUG,
        (false, _) => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level)
        .with_target(false)
        .with_level(true)
        .init();
}

/// Parse `"ㄱ ㅏ <sp> ㄴ"` or `"ㄱㅏㄴ"` into phonemes
fn parse_phonemes(input: &str) -> Vec<Phoneme> {
    input
        .split_whitespace()
        .flat_map(|token| {
            if token.starts_with('<') {
                vec![Phoneme::from_symbol(token)]
            } else {
                token.chars().map(Phoneme::from_char).collect()
            }
        })
        .collect()
}

fn join_phonemes(phonemes: &[Phoneme]) -> String {
    phonemes
        .iter()
        .map(|p| p.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

fn print_result(result: &PronunciationResult) {
    if !result.has_target {
        println!("Expected text contains no Hangul; nothing to score");
        return;
    }
    println!("Accuracy:  {:.1}%", result.phoneme_accuracy);
    println!("PER:       {:.4}", result.per);
    println!("Expected:  {}", join_phonemes(&result.expected_phonemes));
    println!("Heard:     {}", join_phonemes(&result.predicted_phonemes));
    println!(
        "Edits:     {} substitutions, {} insertions, {} deletions",
        result.substitutions, result.insertions, result.deletions
    );
    for pair in &result.wrong_phonemes {
        println!("  {} -> {}", pair.expected, pair.predicted);
    }
    for word in &result.word_scores {
        let mark = if word.mispronounced { "✗" } else { "✓" };
        println!("  {} {} (PER {:.2})", mark, word.word, word.per);
    }
}

fn print_word_accuracy(result: &WordAccuracy) {
    println!("Word accuracy: {:.1}%", result.accuracy);
    println!("WER:           {:.4}", result.wer);
    println!("Expected:      {}", result.expected_words.join(" "));
    println!("Spoken:        {}", result.spoken_words.join(" "));
}

#[derive(Serialize)]
struct FallbackReport<'a> {
    unavailable: String,
    word_accuracy: &'a WordAccuracy,
}

fn run_check(
    config: &MalsoriConfig,
    audio: PathBuf,
    text: &str,
    format: Option<String>,
    sample_rate: u32,
    transcript: Option<String>,
    json: bool,
) -> Result<ExitCode> {
    let bytes = std::fs::read(&audio)
        .with_context(|| format!("Failed to read {}", audio.display()))?;
    let format_hint = format.unwrap_or_else(|| {
        audio
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("wav")
            .to_string()
    });

    let checker = PronunciationChecker::load(&config.model_config()?);
    let outcome = checker.check(&bytes, text, sample_rate, &format_hint);

    match (&outcome, transcript) {
        (CheckOutcome::Scored(result), _) => {
            if json {
                print_json(&outcome)?;
            } else {
                print_result(result);
            }
            Ok(ExitCode::SUCCESS)
        }
        (CheckOutcome::Unavailable(reason), Some(transcript)) => {
            warn!("Pronunciation check unavailable ({}), using transcript", reason);
            let accuracy = word_accuracy(text, &transcript, true);
            if json {
                print_json(&FallbackReport {
                    unavailable: reason.to_string(),
                    word_accuracy: &accuracy,
                })?;
            } else {
                println!("Pronunciation check unavailable: {}", reason);
                print_word_accuracy(&accuracy);
            }
            Ok(ExitCode::SUCCESS)
        }
        (CheckOutcome::Unavailable(reason), None) => {
            if json {
                print_json(&outcome)?;
            } else {
                println!("Pronunciation check unavailable: {}", reason);
            }
            Ok(ExitCode::from(2))
        }
    }
}

#[derive(Serialize)]
struct G2pWord {
    word: String,
    phonemes: Vec<Phoneme>,
    #[serde(skip_serializing_if = "Option::is_none")]
    ipa: Option<String>,
}

fn run_g2p(text: &str, ipa: bool, json: bool) -> Result<ExitCode> {
    if json {
        let words: Vec<G2pWord> = decompose_words(text)
            .into_iter()
            .map(|(word, phonemes)| G2pWord {
                ipa: ipa.then(|| ipa_string(&phonemes)),
                word,
                phonemes,
            })
            .collect();
        print_json(&words)?;
    } else {
        let phonemes = decompose(text);
        println!("{}", join_phonemes(&phonemes));
        if ipa {
            println!("{}", ipa_string(&phonemes));
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.quiet);

    let config = MalsoriConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    info!("Configuration loaded from {}", config.config_path.display());

    match cli.command {
        Command::Check {
            audio,
            text,
            format,
            sample_rate,
            transcript,
            json,
        } => run_check(&config, audio, &text, format, sample_rate, transcript, json),

        Command::G2p { text, ipa, json } => run_g2p(&text, ipa, json),

        Command::Score {
            text,
            predicted,
            json,
        } => {
            let result = score_text(&text, &parse_phonemes(&predicted), &config.scoring);
            if json {
                print_json(&result)?;
            } else {
                print_result(&result);
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::WordAccuracy {
            expected,
            spoken,
            keep_fillers,
            json,
        } => {
            let result = word_accuracy(&expected, &spoken, !keep_fillers);
            if json {
                print_json(&result)?;
            } else {
                print_word_accuracy(&result);
            }
            Ok(ExitCode::SUCCESS)
        }

        Command::Status { json } => {
            let checker = PronunciationChecker::load(&config.model_config()?);
            let status = checker.status();
            if json {
                print_json(&status)?;
            } else if status.available {
                println!("Model: ready");
                if let Some(dir) = &status.model_dir {
                    println!("  directory:   {}", dir.display());
                }
                if let Some(dims) = status.classifier {
                    println!(
                        "  classifier:  {} blocks, dim {}, {} heads, {} classes",
                        dims.depth, dims.dim, dims.heads, dims.num_classes
                    );
                }
                if let Some(blank) = status.blank_id {
                    println!("  blank id:    {}", blank);
                }
            } else {
                println!(
                    "Model: unavailable ({})",
                    status.reason.as_deref().unwrap_or("unknown")
                );
            }
            Ok(if status.available {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_phonemes() {
        let spaced = parse_phonemes("ㄱ ㅏ <sp> ㄴ");
        assert_eq!(
            spaced,
            vec![
                Phoneme::Jamo("ㄱ"),
                Phoneme::Jamo("ㅏ"),
                Phoneme::WordBoundary,
                Phoneme::Jamo("ㄴ"),
            ]
        );
        assert_eq!(parse_phonemes("ㄱㅏㄴ"), parse_phonemes("ㄱ ㅏ ㄴ"));
        assert!(parse_phonemes("   ").is_empty());
    }

    #[test]
    fn test_subcommand_parsing() {
        let cli = Cli::try_parse_from([
            "malsori", "-v", "score", "--text", "간", "--predicted", "ㄱ ㅏ",
        ])
        .unwrap();
        assert_eq!(cli.verbose, 1);
        assert!(matches!(cli.command, Command::Score { .. }));

        assert!(Cli::try_parse_from(["malsori", "check", "--text", "간"]).is_err());
    }
}
