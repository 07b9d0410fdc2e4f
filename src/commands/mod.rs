//! Voice command parsing and dispatch
//!
//! [`CommandParser`] turns recognized text into a canonical command.
//! [`CommandDispatcher`] binds it to a registered [`CommandHandler`] and
//! delivers the response.

mod announce;
pub mod context;
pub mod descriptor;
mod dispatcher;
mod parser;

pub use announce::AnnounceHandler;
pub use context::{
    Author, DispatchContext, GuildId, GuildRef, MemberDirectory, PermissionView, Player,
    PlayerHandle, PlayerResolver, SyntheticMessage, UserId, VoiceChannelRef,
};
pub use descriptor::{
    ArgValue, BoundArgs, CommandDescriptor, CommandHandler, ContextParam, FnHandler, ParamKind,
    ParamSpec, Response, handler_fn,
};
pub use dispatcher::{CommandDispatcher, DispatchOutcome, HandlerRegistry};
pub use parser::{CommandEntry, CommandParser, CommandTable, ParsedCommand};
