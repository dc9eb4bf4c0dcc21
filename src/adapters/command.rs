use super::{AdapterError, Judge, Judgement, PieceGenerator};
use async_trait::async_trait;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::{io::ErrorKind, process::Stdio, time::Duration};
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::debug;

/// An external program speaking JSON: one request object on stdin,
/// one response object on stdout, non-zero exit on failure.
#[derive(Debug, Clone)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    timeout: Duration
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>, timeout: Duration) -> CommandSpec {
        CommandSpec {
            program: program.into(),
            args,
            timeout
        }
    }

    /// Splits on whitespace; quoting is not supported.
    pub fn parse(command_line: &str, timeout: Duration) -> Result<CommandSpec, AdapterError> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| AdapterError::Transport("empty command line".to_string()))?;

        Ok(CommandSpec::new(program, parts.collect(), timeout))
    }

    async fn run<Req: Serialize, Resp: DeserializeOwned>(&self, request: &Req) -> Result<Resp, AdapterError> {
        let payload = serde_json::to_vec(request)?;

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            // The program may exit without reading its input; its exit status decides.
            if let Err(e) = stdin.write_all(&payload).await {
                if e.kind() != ErrorKind::BrokenPipe {
                    return Err(e.into());
                }
            }
        }

        let output = tokio::time::timeout(self.timeout, child.wait_with_output())
            .await
            .map_err(|_| AdapterError::Timeout)??;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(AdapterError::Transport(format!(
                "{} exited with {}: {}",
                self.program,
                output.status,
                stderr.trim()
            )));
        }

        debug!(program = %self.program, bytes = output.stdout.len(), "Adapter command finished");

        serde_json::from_slice(&output.stdout).map_err(|e| AdapterError::Malformed(e.to_string()))
    }
}

#[derive(Serialize)]
struct JudgeRequest<'a> {
    task: &'static str,
    text_a: &'a str,
    text_b: &'a str,
    rubric: &'a str,
    context: Option<&'a str>
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    task: &'static str,
    prompt: &'a str,
    model: &'a str,
    parent_text: Option<&'a str>,
    temperature: Option<f64>
}

#[derive(Deserialize)]
struct GenerateResponse {
    text: String
}

pub struct CommandJudge {
    command: CommandSpec
}

impl CommandJudge {
    pub fn new(command: CommandSpec) -> CommandJudge {
        CommandJudge { command }
    }
}

#[async_trait]
impl Judge for CommandJudge {
    async fn judge(
        &self,
        text_a: &str,
        text_b: &str,
        rubric: &str,
        context: Option<&str>
    ) -> Result<Judgement, AdapterError> {
        let request = JudgeRequest {
            task: "judge",
            text_a,
            text_b,
            rubric,
            context
        };

        self.command.run(&request).await
    }
}

pub struct CommandGenerator {
    command: CommandSpec
}

impl CommandGenerator {
    pub fn new(command: CommandSpec) -> CommandGenerator {
        CommandGenerator { command }
    }

    async fn generate(&self, request: GenerateRequest<'_>) -> Result<String, AdapterError> {
        let response: GenerateResponse = self.command.run(&request).await?;
        if response.text.trim().is_empty() {
            return Err(AdapterError::Malformed("generator returned an empty piece".to_string()));
        }

        Ok(response.text)
    }
}

#[async_trait]
impl PieceGenerator for CommandGenerator {
    async fn generate_initial(&self, prompt: &str, model: &str) -> Result<String, AdapterError> {
        self.generate(GenerateRequest {
            task: "initial",
            prompt,
            model,
            parent_text: None,
            temperature: None
        })
        .await
    }

    async fn generate_variant(
        &self,
        parent_text: &str,
        parent_prompt: &str,
        model: &str,
        temperature: f64
    ) -> Result<String, AdapterError> {
        self.generate(GenerateRequest {
            task: "variant",
            prompt: parent_prompt,
            model,
            parent_text: Some(parent_text),
            temperature: Some(temperature)
        })
        .await
    }
}
