//! Turns thread snapshots into terminal lines, printing only what changed.

use std::collections::HashMap;

use chrono::Local;
use client_core::ThreadSnapshot;
use shared::domain::{Author, Message, MessageId};

pub const TYPING_INDICATOR: &str = "ALU_SC is typing...";
pub const CLEARED_BANNER: &str = "-- chat cleared --";

pub fn format_message(message: &Message, edited: bool) -> String {
    let who = match message.author {
        Author::User => "You",
        Author::Assistant => "ALU_SC",
    };
    let time = message.created_at.with_timezone(&Local).format("%H:%M");
    let marker = if edited { " (edited)" } else { "" };

    let mut lines = message.content.lines();
    let first = lines.next().unwrap_or_default();
    let mut out = format!("[{time}] #{} {who}{marker}: {first}", message.id);
    for line in lines {
        out.push_str("\n    ");
        out.push_str(line);
    }
    out
}

#[derive(Debug, Default)]
pub struct ThreadView {
    generation: u64,
    shown: HashMap<MessageId, String>,
    awaiting: bool,
}

impl ThreadView {
    pub fn update(&mut self, snapshot: &ThreadSnapshot) -> Vec<String> {
        let mut out = Vec::new();
        if snapshot.generation != self.generation {
            self.generation = snapshot.generation;
            self.shown.clear();
            self.awaiting = false;
            out.push(CLEARED_BANNER.to_string());
        }

        for message in &snapshot.messages {
            match self.shown.get(&message.id) {
                Some(content) if *content == message.content => {}
                Some(_) => {
                    out.push(format_message(message, true));
                    self.shown.insert(message.id, message.content.clone());
                }
                None => {
                    out.push(format_message(message, false));
                    self.shown.insert(message.id, message.content.clone());
                }
            }
        }

        if snapshot.awaiting_response && !self.awaiting {
            out.push(TYPING_INDICATOR.to_string());
        }
        self.awaiting = snapshot.awaiting_response;
        out
    }
}
