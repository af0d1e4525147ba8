use crate::scene::OverlayStyle;
use crate::settings;

#[derive(Clone)]
pub(crate) struct ServerState {
    pub(crate) settings: settings::Settings,
    pub(crate) style: OverlayStyle,
}
