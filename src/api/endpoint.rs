pub type Endpoint = str;

pub const DEVICE_LIST: &Endpoint = "/cgi-bin/dl_cgi?Command=DeviceList";
