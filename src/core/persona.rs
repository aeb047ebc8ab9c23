use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::core::store::{Collection, Store, StoreError};

/// System prompt used when a persona is unknown.
pub const DEFAULT_PERSONA_PROMPT: &str = "You are a helpful assistant.";
pub const DEFAULT_PERSONA: &str = "Calango (Default)";

/// A named system prompt applied to a turn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub name: String,
    pub prompt: String,
}

impl Persona {
    pub fn new(name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prompt: prompt.into(),
        }
    }
}

fn seed_personas() -> Vec<Persona> {
    vec![
        Persona::new(DEFAULT_PERSONA, "You are a helpful AI assistant."),
        Persona::new(
            "Python Expert",
            "You are a Senior Python Engineer. Be concise, use type hints, and focus on clean, performant code.",
        ),
        Persona::new(
            "Creative Writer",
            "You are a visionary writer. Use evocative language, vivid imagery, and varied sentence structures.",
        ),
    ]
}

/// Persona presets stored in the `personas` collection.
#[derive(Clone)]
pub struct PersonaBook {
    store: Arc<Store>,
}

impl PersonaBook {
    /// Open the book, seeding the built-in personas into an empty collection.
    pub fn open(store: Arc<Store>) -> Result<Self, StoreError> {
        let book = Self { store };
        if book.store.count(Collection::Personas)? == 0 {
            for persona in seed_personas() {
                book.upsert(&persona)?;
            }
            debug!("seeded default personas");
        }
        Ok(book)
    }

    pub fn upsert(&self, persona: &Persona) -> Result<(), StoreError> {
        self.store
            .upsert(Collection::Personas, &persona.name, persona)
    }

    pub fn remove(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.store.remove(Collection::Personas, name)? > 0)
    }

    pub fn get(&self, name: &str) -> Result<Option<Persona>, StoreError> {
        self.store.get(Collection::Personas, name)
    }

    pub fn list(&self) -> Result<Vec<Persona>, StoreError> {
        self.store.all(Collection::Personas)
    }

    /// Prompt for `name`, or the generic assistant prompt.
    pub fn prompt_for(&self, name: &str) -> Result<String, StoreError> {
        Ok(self
            .get(name)?
            .map(|persona| persona.prompt)
            .unwrap_or_else(|| DEFAULT_PERSONA_PROMPT.to_string()))
    }
}
