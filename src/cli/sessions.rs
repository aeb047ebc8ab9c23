//! Session listing and management

use std::error::Error;
use uuid::Uuid;

use crate::core::app::Calango;
use crate::core::message::Role;

pub fn list_sessions(app: &Calango) -> Result<(), Box<dyn Error>> {
    let sessions = app.sessions.list_all()?;
    if sessions.is_empty() {
        println!("No sessions yet.");
        return Ok(());
    }
    for session in sessions {
        println!(
            "{}  {}  {}",
            session.id,
            session.created_at.format("%Y-%m-%d %H:%M"),
            session.title
        );
    }
    Ok(())
}

pub fn show_session(app: &Calango, id: Uuid) -> Result<(), Box<dyn Error>> {
    let session = app
        .sessions
        .get(id)?
        .ok_or_else(|| format!("Session {id} not found"))?;
    println!("# {}", session.title);

    for entry in app.chat.history(id)? {
        println!();
        match entry.role {
            Role::Assistant => println!(
                "[{}] {}:{} ({})",
                entry.time.format("%H:%M"),
                entry.provider,
                entry.model,
                entry.persona
            ),
            role => println!("[{}] {}", entry.time.format("%H:%M"), role.as_str()),
        }
        println!("{}", entry.content);
    }
    Ok(())
}

pub fn rename_session(app: &Calango, id: Uuid, title: &str) -> Result<(), Box<dyn Error>> {
    let title = title.trim();
    if title.is_empty() {
        return Err("Session title cannot be empty".into());
    }
    if app.sessions.rename(id, title)? {
        println!("✅ Renamed session {id} to: {title}");
    } else {
        println!("Session {id} already has that title");
    }
    Ok(())
}

pub fn delete_session(app: &Calango, id: Uuid) -> Result<(), Box<dyn Error>> {
    app.sessions.delete(id)?;
    println!("✅ Deleted session {id}");
    Ok(())
}
