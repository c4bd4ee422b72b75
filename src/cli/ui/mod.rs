mod device_view;
mod painter;
mod pairing_view;
mod scan_view;
mod table;

pub(crate) use self::device_view::{DeviceListView, DeviceView};
pub(crate) use self::painter::Painter;
pub(crate) use self::pairing_view::{PairSummaryView, PairingCodeView};
pub(crate) use self::scan_view::{DecodedView, ScanLineView};
