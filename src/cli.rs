// Command line surface: flags, the command words, and merging in lines
// piped through stdin.

use clap::{ArgAction, Parser};

pub const ABOUT: &str = "Execute shell commands in cloud.

If the command mentions files, those are uploaded first and then the command is executed.
Files the command produces are downloaded back next to where you ran it.";

pub const USAGE_EXAMPLES: &str = "Usage
  resh <shell command>
  cat <file> | resh [ <shell command> ... ]

Example
  resh echo Hello World
  resh < batch.txt
  cat batch.txt | resh";

#[derive(Parser, Debug, Default)]
#[command(
    name = "resh",
    about = ABOUT,
    after_help = USAGE_EXAMPLES,
    disable_version_flag = true
)]
pub struct Cli {
    /// Print version
    #[arg(short = 'v', long = "version", action = ArgAction::SetTrue)]
    pub version: bool,

    /// Service URL (remembered for next time)
    #[arg(short = 's', long = "server", value_name = "URL")]
    pub server: Option<String>,

    /// Service key (remembered for next time)
    #[arg(short = 'k', long = "key", value_name = "KEY")]
    pub key: Option<String>,

    /// The shell command to run remotely
    #[arg(
        value_name = "COMMAND",
        trailing_var_arg = true,
        allow_hyphen_values = true
    )]
    pub command: Vec<String>,
}

impl Cli {
    /// Final command tokens: argv words, then any piped lines. A single
    /// token is taken to be a whole quoted command and split on spaces.
    pub fn command_tokens(&self, piped: Option<&str>) -> Vec<String> {
        let mut tokens = self.command.clone();
        if let Some(data) = piped {
            let data = data.trim();
            if !data.is_empty() {
                tokens.extend(data.split('\n').map(|line| line.trim_end_matches('\r').to_string()));
            }
        }
        if tokens.len() == 1 {
            return tokens[0]
                .split(' ')
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .collect();
        }
        tokens
    }
}
