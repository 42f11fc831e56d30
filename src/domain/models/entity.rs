//! Typed domain entities decoded from resolved nodes.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::node::{InlinedNode, ResolvedNode};
use super::pointer::GraphPointer;
use crate::domain::errors::{SyncError, SyncResult};

/// Kind of entity, derived from the root segment of its pointer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Game,
    Actor,
    Card,
    Deck,
    Agreement,
    User,
}

impl EntityKind {
    pub const ALL: [Self; 6] = [
        Self::Game,
        Self::Actor,
        Self::Card,
        Self::Deck,
        Self::Agreement,
        Self::User,
    ];

    /// Root collection segment in the store (`actors`, `games`, ...).
    pub fn root(&self) -> &'static str {
        match self {
            Self::Game => "games",
            Self::Actor => "actors",
            Self::Card => "cards",
            Self::Deck => "decks",
            Self::Agreement => "agreements",
            Self::User => "users",
        }
    }

    pub fn from_root(segment: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.root() == segment)
    }

    /// Canonical pointer for an entity of this kind.
    pub fn pointer(&self, id: &str) -> SyncResult<GraphPointer> {
        GraphPointer::parse(self.root())?.child(id)
    }

    /// Kind named by a two-segment entity pointer such as `actors/a1`.
    pub fn of_pointer(pointer: &GraphPointer) -> Option<Self> {
        if pointer.segment_count() != 2 {
            return None;
        }
        pointer.segments().next().and_then(Self::from_root)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Game => "game",
            Self::Actor => "actor",
            Self::Card => "card",
            Self::Deck => "deck",
            Self::Agreement => "agreement",
            Self::User => "user",
        };
        f.write_str(name)
    }
}

/// Collections hanging off a game record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GameCollection {
    Actors,
    Cards,
    Agreements,
    Decks,
}

impl GameCollection {
    pub fn field(&self) -> &'static str {
        match self {
            Self::Actors => "actors",
            Self::Cards => "cards",
            Self::Agreements => "agreements",
            Self::Decks => "decks",
        }
    }

    pub fn item_kind(&self) -> EntityKind {
        match self {
            Self::Actors => EntityKind::Actor,
            Self::Cards => EntityKind::Card,
            Self::Agreements => EntityKind::Agreement,
            Self::Decks => EntityKind::Deck,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Game {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub created_by: Option<String>,
    pub status: Option<String>,
    pub actors: GraphPointer,
    pub cards: GraphPointer,
    pub agreements: GraphPointer,
    pub decks: GraphPointer,
    /// Node holding the authoritative user -> actor mapping.
    pub identity: GraphPointer,
}

impl Game {
    fn from_node(node: &ResolvedNode) -> SyncResult<Self> {
        let child = |field: &str| -> SyncResult<GraphPointer> {
            match node.pointer(field) {
                Some(p) => Ok(p.clone()),
                None => node.soul.child(field),
            }
        };
        Ok(Self {
            id: node.id().to_string(),
            name: node.text("name"),
            description: node.text("description"),
            created_by: node.reference_id("created_by"),
            status: node.text("status"),
            actors: child("actors")?,
            cards: child("cards")?,
            agreements: child("agreements")?,
            decks: child("decks")?,
            identity: child("identity")?,
        })
    }

    pub fn collection(&self, collection: GameCollection) -> &GraphPointer {
        match collection {
            GameCollection::Actors => &self.actors,
            GameCollection::Cards => &self.cards,
            GameCollection::Agreements => &self.agreements,
            GameCollection::Decks => &self.decks,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Actor {
    pub id: String,
    pub game_id: Option<String>,
    /// Owning user.
    pub user_id: Option<String>,
    pub name: Option<String>,
    pub card_id: Option<String>,
    pub card: Option<InlinedNode>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Actor {
    fn from_node(node: &ResolvedNode) -> Self {
        Self {
            id: node.id().to_string(),
            game_id: node.reference_id("game_id").or_else(|| node.reference_id("game")),
            user_id: node.reference_id("user_id").or_else(|| node.reference_id("user")),
            name: node.text("name"),
            card_id: node.reference_id("card").or_else(|| node.text("card_id")),
            card: node.inline("card").cloned(),
            created_at: node.timestamp("created_at"),
        }
    }

    pub fn is_owned_by(&self, user_id: &str) -> bool {
        self.user_id.as_deref() == Some(user_id)
    }

    /// Actor plays in `game_id` and belongs to `user_id`.
    pub fn belongs_to(&self, game_id: &str, user_id: &str) -> bool {
        self.is_owned_by(user_id) && self.game_id.as_deref() == Some(game_id)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Card {
    pub id: String,
    pub title: Option<String>,
    pub role: Option<String>,
    pub description: Option<String>,
    pub deck_id: Option<String>,
}

impl Card {
    fn from_node(node: &ResolvedNode) -> Self {
        Self {
            id: node.id().to_string(),
            title: node.text("title").or_else(|| node.text("name")),
            role: node.text("role"),
            description: node.text("description"),
            deck_id: node.reference_id("deck"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Deck {
    pub id: String,
    pub name: Option<String>,
    pub game_id: Option<String>,
}

impl Deck {
    fn from_node(node: &ResolvedNode) -> Self {
        Self {
            id: node.id().to_string(),
            name: node.text("name"),
            game_id: node.reference_id("game_id").or_else(|| node.reference_id("game")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Agreement {
    pub id: String,
    pub game_id: Option<String>,
    pub title: Option<String>,
    pub body: Option<String>,
    pub status: Option<String>,
    pub proposer_id: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
}

impl Agreement {
    fn from_node(node: &ResolvedNode) -> Self {
        Self {
            id: node.id().to_string(),
            game_id: node.reference_id("game_id").or_else(|| node.reference_id("game")),
            title: node.text("title"),
            body: node.text("body"),
            status: node.text("status"),
            proposer_id: node.reference_id("proposer"),
            created_at: node.timestamp("created_at"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct User {
    pub id: String,
    pub alias: Option<String>,
    pub display_name: Option<String>,
}

impl User {
    fn from_node(node: &ResolvedNode) -> Self {
        Self {
            id: node.id().to_string(),
            alias: node.text("alias"),
            display_name: node.text("display_name").or_else(|| node.text("name")),
        }
    }
}

/// Point-in-time snapshot of a typed entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Entity {
    Game(Game),
    Actor(Actor),
    Card(Card),
    Deck(Deck),
    Agreement(Agreement),
    User(User),
}

impl Entity {
    /// Decode a resolved node as an entity of `kind`.
    ///
    /// Fields with an unexpected shape are dropped (and logged by the node
    /// accessors); only a game whose collection paths cannot be derived fails.
    pub fn decode(kind: EntityKind, node: &ResolvedNode) -> SyncResult<Self> {
        Ok(match kind {
            EntityKind::Game => Self::Game(Game::from_node(node)?),
            EntityKind::Actor => Self::Actor(Actor::from_node(node)),
            EntityKind::Card => Self::Card(Card::from_node(node)),
            EntityKind::Deck => Self::Deck(Deck::from_node(node)),
            EntityKind::Agreement => Self::Agreement(Agreement::from_node(node)),
            EntityKind::User => Self::User(User::from_node(node)),
        })
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Game(_) => EntityKind::Game,
            Self::Actor(_) => EntityKind::Actor,
            Self::Card(_) => EntityKind::Card,
            Self::Deck(_) => EntityKind::Deck,
            Self::Agreement(_) => EntityKind::Agreement,
            Self::User(_) => EntityKind::User,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Game(e) => &e.id,
            Self::Actor(e) => &e.id,
            Self::Card(e) => &e.id,
            Self::Deck(e) => &e.id,
            Self::Agreement(e) => &e.id,
            Self::User(e) => &e.id,
        }
    }

    /// Canonical pointer, used as the cache key.
    pub fn pointer(&self) -> SyncResult<GraphPointer> {
        self.kind().pointer(self.id())
    }

    pub fn as_actor(&self) -> Option<&Actor> {
        match self {
            Self::Actor(actor) => Some(actor),
            _ => None,
        }
    }

    pub fn into_actor(self) -> Option<Actor> {
        match self {
            Self::Actor(actor) => Some(actor),
            _ => None,
        }
    }

    pub fn into_game(self) -> Option<Game> {
        match self {
            Self::Game(game) => Some(game),
            _ => None,
        }
    }

    pub fn into_card(self) -> Option<Card> {
        match self {
            Self::Card(card) => Some(card),
            _ => None,
        }
    }

    pub fn into_agreement(self) -> Option<Agreement> {
        match self {
            Self::Agreement(agreement) => Some(agreement),
            _ => None,
        }
    }
}

/// Kind of the entity a pointer names, or `MalformedPointer` when the pointer
/// is not an entity pointer.
pub fn entity_kind_of(pointer: &GraphPointer) -> SyncResult<EntityKind> {
    EntityKind::of_pointer(pointer).ok_or_else(|| {
        SyncError::malformed(pointer.as_str(), "not an entity pointer (expected <kind>/<id>)")
    })
}
