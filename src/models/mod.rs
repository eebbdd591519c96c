pub mod invitation;
pub mod participant;
pub mod room;
pub mod signalling;

pub use invitation::{
    AuthorizeInviteRequest, AuthorizeInviteResponse, InvitationKey, KeyEvent, KeyPushMessage,
    RoomInvitationResponse,
};
pub use participant::{generate_participant_id, Claims, Participant, PARTICIPANT_ID_LEN};
pub use room::{CreateRoomResponse, JoinRoomRequest, JoinRoomResponse, Room};
pub use signalling::{AnswerResponse, OfferRequest, SessionAnswer};
