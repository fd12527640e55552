use agentcore::{matches_exit_command, ChatInterface, NodeError, Value};
use async_trait::async_trait;
use tokio::io::{stdin, stdout, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;

/// Chat front end on the process's stdin and stdout
pub struct ConsoleChat {
    lines: Mutex<Lines<BufReader<Stdin>>>,
    exit_commands: Vec<String>,
}

impl ConsoleChat {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(stdin()).lines()),
            exit_commands: Vec::new(),
        }
    }

    /// Phrases accepted verbatim by choice prompts so they can end the run.
    pub fn with_exit_commands(mut self, commands: Vec<String>) -> Self {
        self.exit_commands = commands;
        self
    }

    async fn write(&self, text: &str) -> Result<(), NodeError> {
        let mut out = stdout();
        out.write_all(text.as_bytes())
            .await
            .map_err(|e| NodeError::Interaction(e.to_string()))?;
        out.flush()
            .await
            .map_err(|e| NodeError::Interaction(e.to_string()))
    }

    /// Next line from stdin; `None` at end of input
    async fn read_line(&self) -> Result<Option<String>, NodeError> {
        self.lines
            .lock()
            .await
            .next_line()
            .await
            .map_err(|e| NodeError::Interaction(e.to_string()))
    }
}

impl Default for ConsoleChat {
    fn default() -> Self {
        Self::new()
    }
}

/// Match an answer against the options by number (1-based) or by text.
pub fn pick_option(answer: &str, options: &[String]) -> Option<String> {
    let answer = answer.trim();
    if let Ok(n) = answer.parse::<usize>() {
        if (1..=options.len()).contains(&n) {
            return Some(options[n - 1].clone());
        }
    }
    options
        .iter()
        .find(|option| option.eq_ignore_ascii_case(answer))
        .cloned()
}

#[async_trait]
impl ChatInterface for ConsoleChat {
    async fn send_message(&self, content: &str) -> Result<(), NodeError> {
        self.write(&format!("{}\n", content)).await
    }

    async fn ask_input(&self, prompt: &str) -> Result<Option<String>, NodeError> {
        self.write(&format!("{}\n> ", prompt)).await?;
        self.read_line().await
    }

    async fn ask_choice(&self, prompt: &str, options: &[String]) -> Result<Option<String>, NodeError> {
        let mut menu = format!("{}\n", prompt);
        for (i, option) in options.iter().enumerate() {
            menu.push_str(&format!("  {}. {}\n", i + 1, option));
        }

        loop {
            self.write(&format!("{}> ", menu)).await?;
            let Some(answer) = self.read_line().await? else {
                return Ok(None);
            };
            match pick_option(&answer, options) {
                Some(choice) => return Ok(Some(choice)),
                None if matches_exit_command(&self.exit_commands, &answer) => {
                    return Ok(Some(answer))
                }
                None => self.write("Please pick one of the listed options.\n").await?,
            }
        }
    }

    async fn display(&self, title: &str, data: &Value) -> Result<(), NodeError> {
        let body = serde_json::to_string_pretty(data)
            .map_err(|e| NodeError::Interaction(e.to_string()))?;
        self.write(&format!("== {} ==\n{}\n", title, body)).await
    }
}
