//! Fallback handler that echoes a recognized command

use std::sync::Arc;

use async_trait::async_trait;

use super::descriptor::{BoundArgs, CommandDescriptor, CommandHandler, ContextParam, Response};
use super::dispatcher::HandlerRegistry;
use super::parser::CommandTable;
use crate::Result;

/// Announces `🔊 명령어: `cmd` args` in the text channel
#[derive(Debug)]
pub struct AnnounceHandler {
    descriptor: CommandDescriptor,
}

impl AnnounceHandler {
    #[must_use]
    pub fn new(command: &str) -> Self {
        Self {
            descriptor: CommandDescriptor::new(command).param(ContextParam::LeftoverArgs.name()),
        }
    }

    /// Register an announcer for every table command that has no handler yet
    ///
    /// Returns how many were added.
    pub fn register_missing(registry: &mut HandlerRegistry, table: &CommandTable) -> usize {
        let mut added = 0;
        for command in table.commands() {
            if !registry.contains(command) {
                registry.register(Arc::new(Self::new(command)));
                added += 1;
            }
        }
        added
    }
}

#[async_trait]
impl CommandHandler for AnnounceHandler {
    fn descriptor(&self) -> &CommandDescriptor {
        &self.descriptor
    }

    async fn invoke(&self, args: BoundArgs) -> Result<Option<Response>> {
        let tokens = args
            .tokens(ContextParam::LeftoverArgs.name())
            .map(|t| t.join(" "))
            .unwrap_or_default();
        let content = format!("🔊 명령어: `{}` {tokens}", self.descriptor.name());
        Ok(Some(Response::new(content.trim_end())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::descriptor::ArgValue;
    use crate::commands::descriptor::handler_fn;

    #[tokio::test]
    async fn test_announce_content() {
        let handler = AnnounceHandler::new("play");
        let mut args = BoundArgs::default();
        args.insert(
            "leftover_args",
            ArgValue::Tokens(vec!["아이유".to_string(), "좋은".to_string(), "날".to_string()]),
        );

        let response = handler.invoke(args).await.unwrap().unwrap();
        assert_eq!(response.content, "🔊 명령어: `play` 아이유 좋은 날");

        let response = AnnounceHandler::new("skip")
            .invoke(BoundArgs::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(response.content, "🔊 명령어: `skip`");
    }

    #[test]
    fn test_register_missing_keeps_existing_handlers() {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(handler_fn(CommandDescriptor::new("skip"), |_| async {
            Ok(None)
        })));
        let table = CommandTable::korean();

        let added = AnnounceHandler::register_missing(&mut registry, &table);

        assert_eq!(added, table.commands().len() - 1);
        assert!(registry.contains("play"));
        assert!(registry.resolve("skip").unwrap().descriptor().params().is_empty());
    }
}
