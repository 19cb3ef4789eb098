use serde::{Deserialize, Serialize};

/// Client-to-server frame (internally tagged JSON).
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ClientMessage {
    Ready {
        #[serde(default)]
        name: Option<String>,
    },
    Action {
        action: ActionName,
        #[serde(default)]
        target: Option<ActionTarget>,
        #[serde(default)]
        item_type: Option<String>,
    },
}

/// Values of the `action` field. Anything else fails to decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ActionName {
    Move,
    Talk,
    Attack,
    AreaLink,
    Configure,
    Equipment,
}

impl ActionName {
    pub fn as_str(self) -> &'static str {
        match self {
            ActionName::Move => "move",
            ActionName::Talk => "talk",
            ActionName::Attack => "attack",
            ActionName::AreaLink => "areaLink",
            ActionName::Configure => "configure",
            ActionName::Equipment => "equipment",
        }
    }
}

/// `target` is either a networkId or a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ActionTarget {
    Entity(u64),
    Position { x: i32, y: i32 },
}

/// Interactions that target another entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InteractAction {
    Talk,
    Attack,
    AreaLink,
    Configure,
}

impl InteractAction {
    /// Tag used in an entity's `actions` list.
    pub fn tag(self) -> &'static str {
        match self {
            InteractAction::Talk => "talk",
            InteractAction::Attack => "attack",
            InteractAction::AreaLink => "areaLink",
            InteractAction::Configure => "configure",
        }
    }
}

/// A client frame whose target shape has been checked against its action.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientRequest {
    Ready { name: Option<String> },
    Action(ActionRequest),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ActionRequest {
    Move { x: i32, y: i32 },
    Interact { kind: InteractAction, target: u64 },
    Equip { item_type: String },
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(String),
    #[error("message too long ({len} > {max} bytes)")]
    InputTooLong { len: usize, max: usize },
    #[error("unexpected target for action '{action}'")]
    UnexpectedTarget { action: &'static str },
    #[error("action '{action}' requires field '{field}'")]
    MissingField {
        action: &'static str,
        field: &'static str,
    },
    #[error("action received before ready")]
    NotReady,
}

/// Decode and shape-check one text frame.
pub fn parse_client_message(text: &str, max_len: usize) -> Result<ClientRequest, ProtocolError> {
    if text.len() > max_len {
        return Err(ProtocolError::InputTooLong {
            len: text.len(),
            max: max_len,
        });
    }
    let msg: ClientMessage =
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))?;
    msg.into_request()
}

impl ClientMessage {
    pub fn into_request(self) -> Result<ClientRequest, ProtocolError> {
        let (action, target, item_type) = match self {
            ClientMessage::Ready { name } => return Ok(ClientRequest::Ready { name }),
            ClientMessage::Action {
                action,
                target,
                item_type,
            } => (action, target, item_type),
        };

        let kind = match action {
            ActionName::Move => {
                return match target {
                    Some(ActionTarget::Position { x, y }) => {
                        Ok(ClientRequest::Action(ActionRequest::Move { x, y }))
                    }
                    Some(ActionTarget::Entity(_)) => Err(ProtocolError::UnexpectedTarget {
                        action: action.as_str(),
                    }),
                    None => Err(ProtocolError::MissingField {
                        action: action.as_str(),
                        field: "target",
                    }),
                };
            }
            ActionName::Equipment => {
                return item_type
                    .map(|item_type| ClientRequest::Action(ActionRequest::Equip { item_type }))
                    .ok_or(ProtocolError::MissingField {
                        action: action.as_str(),
                        field: "itemType",
                    });
            }
            ActionName::Talk => InteractAction::Talk,
            ActionName::Attack => InteractAction::Attack,
            ActionName::AreaLink => InteractAction::AreaLink,
            ActionName::Configure => InteractAction::Configure,
        };

        match target {
            Some(ActionTarget::Entity(target)) => {
                Ok(ClientRequest::Action(ActionRequest::Interact { kind, target }))
            }
            Some(ActionTarget::Position { .. }) => Err(ProtocolError::UnexpectedTarget {
                action: action.as_str(),
            }),
            None => Err(ProtocolError::MissingField {
                action: action.as_str(),
                field: "target",
            }),
        }
    }
}

/// Server-to-client message (internally tagged JSON).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerMessage {
    Add {
        entity: EntityWire,
    },
    Remove {
        network_id: u64,
    },
    Move {
        network_id: u64,
        pos: PosWire,
        path: Vec<TileWire>,
        speed: f32,
    },
    Update {
        network_id: u64,
        #[serde(skip_serializing_if = "Option::is_none")]
        armor_type: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        speed: Option<f32>,
    },
    Status {
        network_id: u64,
        in_combat: bool,
        hp: i32,
    },
    Dialog {
        title: String,
        text: String,
    },
    ChangeArea {},
    Equipment {
        equipment: EquipmentWire,
    },
    Reconstructor {
        network_id: u64,
        options: Vec<String>,
    },
    Container {
        network_id: u64,
        items: Vec<String>,
    },
    Snapshot {
        area: String,
        width: u32,
        height: u32,
        floor: Vec<Vec<u32>>,
        walls: Vec<Vec<u32>>,
        walkable: Vec<Vec<bool>>,
        entities: Vec<EntityWire>,
    },
    Character {
        entity: EntityWire,
    },
    Error {
        message: String,
    },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            tracing::error!(error = %e, "failed to serialize server message");
            String::from(r#"{"type":"error","message":"internal error"}"#)
        })
    }
}

/// Continuous position in tile units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PosWire {
    pub x: f32,
    pub y: f32,
}

/// A waypoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TileWire {
    pub x: i32,
    pub y: i32,
}

/// Stable entity contract shared with renderers.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityWire {
    pub network_id: u64,
    pub kind: String,
    pub base_kind: String,
    pub name: String,
    pub pos: PosWire,
    pub actions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub equipment: Option<EquipmentWire>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hp: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_hp: Option<i32>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EquipmentWire {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub weapon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub armor: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAX: usize = 4096;

    #[test]
    fn parse_ready_with_and_without_name() {
        assert_eq!(
            parse_client_message(r#"{"type":"ready","name":"Ayla"}"#, MAX).unwrap(),
            ClientRequest::Ready {
                name: Some("Ayla".into())
            }
        );
        assert_eq!(
            parse_client_message(r#"{"type":"ready"}"#, MAX).unwrap(),
            ClientRequest::Ready { name: None }
        );
    }

    #[test]
    fn parse_move() {
        let req = parse_client_message(
            r#"{"type":"action","action":"move","target":{"x":3,"y":4}}"#,
            MAX,
        )
        .unwrap();
        assert_eq!(req, ClientRequest::Action(ActionRequest::Move { x: 3, y: 4 }));
    }

    #[test]
    fn parse_interactions() {
        let req =
            parse_client_message(r#"{"type":"action","action":"areaLink","target":12}"#, MAX).unwrap();
        assert_eq!(
            req,
            ClientRequest::Action(ActionRequest::Interact {
                kind: InteractAction::AreaLink,
                target: 12
            })
        );
        let req =
            parse_client_message(r#"{"type":"action","action":"attack","target":7}"#, MAX).unwrap();
        assert!(matches!(
            req,
            ClientRequest::Action(ActionRequest::Interact {
                kind: InteractAction::Attack,
                ..
            })
        ));
    }

    #[test]
    fn parse_equipment() {
        let req = parse_client_message(
            r#"{"type":"action","action":"equipment","itemType":"sword"}"#,
            MAX,
        )
        .unwrap();
        assert_eq!(
            req,
            ClientRequest::Action(ActionRequest::Equip {
                item_type: "sword".into()
            })
        );
    }

    #[test]
    fn unknown_action_is_malformed() {
        let err =
            parse_client_message(r#"{"type":"action","action":"dance","target":1}"#, MAX).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn wrong_target_shape_rejected() {
        let err = parse_client_message(r#"{"type":"action","action":"move","target":5}"#, MAX)
            .unwrap_err();
        assert_eq!(err, ProtocolError::UnexpectedTarget { action: "move" });

        let err = parse_client_message(
            r#"{"type":"action","action":"talk","target":{"x":1,"y":1}}"#,
            MAX,
        )
        .unwrap_err();
        assert_eq!(err, ProtocolError::UnexpectedTarget { action: "talk" });
    }

    #[test]
    fn missing_fields_rejected() {
        let err = parse_client_message(r#"{"type":"action","action":"talk"}"#, MAX).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::MissingField {
                action: "talk",
                field: "target"
            }
        );
        let err =
            parse_client_message(r#"{"type":"action","action":"equipment"}"#, MAX).unwrap_err();
        assert_eq!(
            err,
            ProtocolError::MissingField {
                action: "equipment",
                field: "itemType"
            }
        );
    }

    #[test]
    fn too_long_rejected_before_decoding() {
        let err = parse_client_message("not even json", 4).unwrap_err();
        assert_eq!(err, ProtocolError::InputTooLong { len: 13, max: 4 });
    }

    #[test]
    fn serialize_move_uses_camel_case() {
        let msg = ServerMessage::Move {
            network_id: 5,
            pos: PosWire { x: 1.5, y: 2.0 },
            path: vec![TileWire { x: 2, y: 2 }],
            speed: 2.0,
        };
        let json: serde_json::Value = serde_json::from_str(&msg.to_json()).unwrap();
        assert_eq!(json["type"], "move");
        assert_eq!(json["networkId"], 5);
        assert_eq!(json["path"][0]["x"], 2);
    }

    #[test]
    fn serialize_status_and_change_area() {
        let msg = ServerMessage::Status {
            network_id: 9,
            in_combat: true,
            hp: 0,
        };
        let json = msg.to_json();
        assert!(json.contains(r#""type":"status""#));
        assert!(json.contains(r#""inCombat":true"#));
        assert!(json.contains(r#""hp":0"#));

        assert_eq!(ServerMessage::ChangeArea {}.to_json(), r#"{"type":"changeArea"}"#);
    }

    #[test]
    fn update_skips_absent_fields() {
        let msg = ServerMessage::Update {
            network_id: 1,
            armor_type: Some("leather".into()),
            speed: None,
        };
        let json = msg.to_json();
        assert!(json.contains(r#""armorType":"leather""#));
        assert!(!json.contains("speed"));
    }

    #[test]
    fn entity_wire_contract() {
        let wire = EntityWire {
            network_id: 3,
            kind: "enemy".into(),
            base_kind: "goblin".into(),
            name: "Goblin".into(),
            pos: PosWire { x: 4.0, y: 1.0 },
            actions: vec!["attack".into()],
            equipment: None,
            hp: Some(10),
            max_hp: Some(10),
        };
        let json: serde_json::Value = serde_json::to_value(&wire).unwrap();
        assert_eq!(json["networkId"], 3);
        assert_eq!(json["baseKind"], "goblin");
        assert_eq!(json["actions"][0], "attack");
        assert_eq!(json["maxHp"], 10);
        assert!(json.get("equipment").is_none());
    }
}
