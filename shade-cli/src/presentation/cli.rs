use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(author, version, about = "shade: an obfuscating build wrapper", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub shared: SharedArgs,

    #[command(subcommand)]
    pub command: Commands,

    #[arg(long, env = "RUST_LOG", default_value = "info", global = true)]
    pub log_level: String,
}

/// Flags common to every subcommand that runs the transformation pipeline
/// (spec §6).
#[derive(clap::Args, Debug, Clone)]
pub struct SharedArgs {
    /// Base64 master seed. Randomly generated and printed when omitted.
    #[arg(long, env = "GARBLE_BUILD_SEED")]
    pub seed: Option<String>,

    /// Base64 per-build nonce. Randomly generated and printed when omitted.
    #[arg(long, env = "GARBLE_BUILD_NONCE")]
    pub nonce: Option<String>,

    /// Literal obfuscation mode: "all", "none", or a comma-separated
    /// package pattern list.
    #[arg(long, default_value = "all")]
    pub literals: String,

    /// Optimize for binary size over obfuscation strength.
    #[arg(long)]
    pub tiny: bool,

    /// Control-flow flattening mode: "off", "auto", "directed", or "all".
    #[arg(long, default_value = "auto")]
    pub controlflow: String,

    /// Keep transforms reversible for `reverse` to undo later.
    #[arg(long)]
    pub reversible: bool,

    /// Rename identifiers even where it isn't strictly required.
    #[arg(long = "force-rename")]
    pub force_rename: bool,

    /// Store build cache entries in plaintext instead of AEAD-sealed.
    #[arg(long = "no-cache-encrypt")]
    pub no_cache_encrypt: bool,

    /// Directory to dump intermediate rewritten sources into.
    #[arg(long)]
    pub debugdir: Option<std::path::PathBuf>,

    /// Enable verbose pipeline debug logging.
    #[arg(long)]
    pub debug: bool,

    /// Comma-separated package patterns in scope for transformation,
    /// mirroring `GOGARBLE`.
    #[arg(long, env = "GOGARBLE", default_value = "*")]
    pub gogarble: String,

    /// Build cache directory.
    #[arg(long, env = "GARBLE_CACHE")]
    pub cache_dir: Option<std::path::PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build a package, obfuscating it in the process.
    Build {
        #[arg(default_value = ".")]
        package: String,
        #[arg(short, long)]
        output: Option<std::path::PathBuf>,
    },

    /// Run `go test` against an obfuscated build.
    Test {
        #[arg(default_value = ".")]
        package: String,
    },

    /// Build and immediately execute the result.
    Run {
        #[arg(default_value = ".")]
        package: String,
        args: Vec<String>,
    },

    /// Recover original identifiers from an obfuscated panic/stack trace.
    Reverse {
        #[arg(default_value = ".")]
        package: String,
        /// Read the trace from a file instead of stdin.
        #[arg(long)]
        input: Option<std::path::PathBuf>,
    },
}
