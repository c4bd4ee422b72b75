mod machine;
mod renderer;
mod state;

pub use self::machine::{PairingMachine, PairingMachineOptions, PairingOutcome};
pub use self::renderer::{PairingImage, PairingImageRenderer, QrTextRenderer, RenderError};
pub use self::state::{ConnectionState, PairingSession, SessionId};
