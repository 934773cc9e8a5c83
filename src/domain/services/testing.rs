/*
Copyright 2024 San Francisco Compute Company

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Test double for the command executor port

use crate::domain::CommandError;
use crate::ports::{CommandExecutor, CommandOutput, SystemCommand};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// Replays canned outputs in order and records every command it receives
///
/// Once the script runs out, every call fails with `ExecutionFailed`.
pub struct ScriptedExecutor {
    responses: Mutex<VecDeque<CommandOutput>>,
    calls: Mutex<Vec<SystemCommand>>,
}

impl ScriptedExecutor {
    pub fn new(responses: Vec<CommandOutput>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Executor answering every call with the same output
    pub fn repeating(output: CommandOutput, times: usize) -> Self {
        Self::new(vec![output; times])
    }

    pub fn output(stdout: &str, exit_code: i32) -> CommandOutput {
        CommandOutput {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: Some(exit_code),
            success: exit_code == 0,
        }
    }

    pub fn calls(&self) -> Vec<SystemCommand> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }
}

#[async_trait]
impl CommandExecutor for ScriptedExecutor {
    async fn execute(&self, command: &SystemCommand) -> Result<CommandOutput, CommandError> {
        self.calls.lock().unwrap().push(command.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| CommandError::ExecutionFailed(format!("{}: no scripted output", command.program)))
    }

    async fn get_command_path(&self, command_name: &str) -> Result<Option<String>, CommandError> {
        Ok(Some(format!("/usr/sbin/{command_name}")))
    }

    async fn has_elevated_privileges(&self) -> Result<bool, CommandError> {
        Ok(true)
    }
}
