use uuid::Uuid;

pub(crate) type RoundId = String;

pub(crate) fn generate_round_id() -> RoundId {
    Uuid::new_v4().to_string()
}
