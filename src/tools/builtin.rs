//! 内置工具
//!
//! 调查类（只读，分析阶段使用）：lookup_user_profile、search_channel_history、current_time。
//! 动作类（有副作用，回复阶段使用）：add_reaction、remember_user_fact。

use std::sync::Arc;

use chrono::{FixedOffset, Utc};
use serde_json::{json, Value};

use super::function::{arg, arg_or, FunctionTool, ToolSignature};
use super::registry::{ToolCatalog, ToolError};
use crate::memory::ProceduralStore;

const HISTORY_SCAN_LIMIT: usize = 100;

pub fn lookup_user_profile(store: Arc<dyn ProceduralStore>) -> FunctionTool {
    FunctionTool::describe(
        "lookup_user_profile",
        "Look up the stored background and preferences of a user.

        Args:
            user_id (str): id of the user to look up; defaults to the current author.",
        ToolSignature::new().param::<Option<String>>("user_id"),
        move |ctx, args| {
            let store = store.clone();
            async move {
                let user_id: String = arg_or(&args, "user_id", ctx.message.author.id.clone())?;
                let mut found = store
                    .fetch(std::slice::from_ref(&user_id))
                    .await
                    .map_err(ToolError::from_error)?;
                Ok(match found.remove(&user_id) {
                    Some(profile) => json!({
                        "user_id": user_id,
                        "background": profile.background,
                        "preferences": profile.preferences,
                        "last_updated": profile.last_updated.to_rfc3339(),
                    }),
                    None => json!({ "user_id": user_id, "found": false }),
                })
            }
        },
    )
}

pub fn search_channel_history() -> FunctionTool {
    FunctionTool::describe(
        "search_channel_history",
        "Search older messages in the current channel for a phrase.

        Args:
            query (str): text to look for, case-insensitive.
            limit (int): maximum number of matches to return,
                newest first (default 5).",
        ToolSignature::new()
            .param::<String>("query")
            .param_default::<usize>("limit"),
        |ctx, args| async move {
            let query: String = arg(&args, "query")?;
            let limit: usize = arg_or(&args, "limit", 5)?;
            let needle = query.to_lowercase();
            let turns = ctx
                .platform
                .recent(&ctx.message.channel_id, HISTORY_SCAN_LIMIT, Some(&ctx.message.id))
                .await
                .map_err(ToolError::from_error)?;
            let matches: Vec<Value> = turns
                .iter()
                .filter(|t| t.content.to_lowercase().contains(&needle))
                .take(limit)
                .map(|t| {
                    json!({
                        "message_id": t.message_id,
                        "author": t.author_name,
                        "content": t.content,
                        "timestamp": t.timestamp.to_rfc3339(),
                    })
                })
                .collect();
            Ok(json!({ "query": query, "matches": matches }))
        },
    )
}

pub fn current_time() -> FunctionTool {
    FunctionTool::describe(
        "current_time",
        "Get the current date and time.

        Args:
            utc_offset_hours (int): offset from UTC in hours, e.g. 8 for UTC+8 (default 0).",
        ToolSignature::new().param_default::<i32>("utc_offset_hours"),
        |_ctx, args| async move {
            let hours: i32 = arg_or(&args, "utc_offset_hours", 0)?;
            let offset = FixedOffset::east_opt(hours * 3600).ok_or_else(|| ToolError::InvalidArgument {
                name: "utc_offset_hours".to_string(),
                reason: format!("{hours} is out of range"),
            })?;
            let now = Utc::now().with_timezone(&offset);
            Ok(json!({
                "iso": now.to_rfc3339(),
                "weekday": now.format("%A").to_string(),
            }))
        },
    )
}

pub fn add_reaction() -> FunctionTool {
    FunctionTool::describe(
        "add_reaction",
        "React to a message with an emoji.

        Args:
            emoji (str): the emoji to add.
            message_id (str): message to react to; defaults to the message being answered.",
        ToolSignature::new()
            .param::<String>("emoji")
            .param::<Option<String>>("message_id"),
        |ctx, args| async move {
            let emoji: String = arg(&args, "emoji")?;
            let message_id: String = arg_or(&args, "message_id", ctx.message.id.clone())?;
            ctx.platform
                .add_reaction(&ctx.message.channel_id, &message_id, &emoji)
                .await
                .map_err(ToolError::from_error)?;
            Ok(json!({ "reacted": emoji, "message_id": message_id }))
        },
    )
}

pub fn remember_user_fact(store: Arc<dyn ProceduralStore>) -> FunctionTool {
    FunctionTool::describe(
        "remember_user_fact",
        "Persist a fact or preference about a user for future conversations.

        Args:
            key (str): what the fact is about, e.g. \"language\"; use \"background\"
                to replace the user's background description.
            value (str): the fact itself.
            user_id (str): user the fact belongs to; defaults to the current author.",
        ToolSignature::new()
            .param::<String>("key")
            .param::<String>("value")
            .param::<Option<String>>("user_id"),
        move |ctx, args| {
            let store = store.clone();
            async move {
                let key: String = arg(&args, "key")?;
                let value: String = arg(&args, "value")?;
                let user_id: String = arg_or(&args, "user_id", ctx.message.author.id.clone())?;
                store
                    .remember(&user_id, &key, &value)
                    .await
                    .map_err(ToolError::from_error)?;
                Ok(json!({ "user_id": user_id, "key": key, "stored": true }))
            }
        },
    )
}

/// 分析阶段目录：只读查询
pub fn investigative_catalog(store: Arc<dyn ProceduralStore>) -> ToolCatalog {
    let mut catalog = ToolCatalog::new();
    catalog.register(lookup_user_profile(store));
    catalog.register(search_channel_history());
    catalog.register(current_time());
    catalog
}

/// 回复阶段目录：有副作用的动作
pub fn action_catalog(store: Arc<dyn ProceduralStore>) -> ToolCatalog {
    let mut catalog = ToolCatalog::new();
    catalog.register(add_reaction());
    catalog.register(remember_user_fact(store));
    catalog
}
