pub use self::playback::*;

mod playback;
