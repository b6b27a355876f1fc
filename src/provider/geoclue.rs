//! GeoClue2 location provider over the system D-Bus.
//!
//! This provider uses zbus's blocking API. Each interaction creates a
//! GeoClue2 client, configures accuracy and distance threshold, starts it,
//! and waits for LocationUpdated signals. GeoClue pushes the first known
//! location shortly after Start, so one-shot requests usually resolve fast.

use zbus::blocking::Connection;
use zbus::zvariant::OwnedObjectPath;

use crate::geo::Fix;
use crate::provider::{
    AcquireOptions, FixSink, LocationProvider, ProviderError, WatchHandle, with_timeout,
};

// GeoClue2 accuracy levels (GClueAccuracyLevel)
const ACCURACY_EXACT: u32 = 8;
const ACCURACY_STREET: u32 = 6;

/// D-Bus proxy trait for the GeoClue2 Manager interface.
#[zbus::proxy(
    interface = "org.freedesktop.GeoClue2.Manager",
    default_service = "org.freedesktop.GeoClue2",
    default_path = "/org/freedesktop/GeoClue2/Manager"
)]
trait GeoClueManager {
    /// Obtain a dedicated client object for this consumer.
    fn get_client(&self) -> zbus::Result<OwnedObjectPath>;
}

/// D-Bus proxy trait for a GeoClue2 Client object.
#[zbus::proxy(
    interface = "org.freedesktop.GeoClue2.Client",
    default_service = "org.freedesktop.GeoClue2"
)]
trait GeoClueClient {
    fn start(&self) -> zbus::Result<()>;

    fn stop(&self) -> zbus::Result<()>;

    /// LocationUpdated signal: old and new Location object paths.
    #[zbus(signal)]
    fn location_updated(
        &self,
        old: zbus::zvariant::ObjectPath<'_>,
        new: zbus::zvariant::ObjectPath<'_>,
    ) -> zbus::Result<()>;

    #[zbus(property)]
    fn desktop_id(&self) -> zbus::Result<String>;
    #[zbus(property)]
    fn set_desktop_id(&self, id: &str) -> zbus::Result<()>;

    #[zbus(property)]
    fn desired_accuracy_level(&self) -> zbus::Result<u32>;
    #[zbus(property)]
    fn set_desired_accuracy_level(&self, level: u32) -> zbus::Result<()>;

    #[zbus(property)]
    fn distance_threshold(&self) -> zbus::Result<u32>;
    #[zbus(property)]
    fn set_distance_threshold(&self, threshold: u32) -> zbus::Result<()>;
}

/// D-Bus proxy trait for a GeoClue2 Location object.
#[zbus::proxy(
    interface = "org.freedesktop.GeoClue2.Location",
    default_service = "org.freedesktop.GeoClue2"
)]
trait GeoClueLocation {
    #[zbus(property)]
    fn latitude(&self) -> zbus::Result<f64>;

    #[zbus(property)]
    fn longitude(&self) -> zbus::Result<f64>;

    #[zbus(property)]
    fn accuracy(&self) -> zbus::Result<f64>;

    #[zbus(property)]
    fn altitude(&self) -> zbus::Result<f64>;

    #[zbus(property)]
    fn speed(&self) -> zbus::Result<f64>;
}

/// Check whether GeoClue2 is reachable on the system bus.
///
/// Used by provider auto-detection. A connection failure or a missing
/// Manager object both count as unavailable.
pub fn is_available() -> bool {
    let Ok(connection) = Connection::system() else {
        return false;
    };
    GeoClueManagerProxyBlocking::new(&connection)
        .and_then(|manager| manager.get_client())
        .is_ok()
}

/// GeoClue2-backed location provider.
pub struct GeoClueProvider;

impl GeoClueProvider {
    pub fn new() -> anyhow::Result<Self> {
        // Probe once at construction so composition fails early with a
        // clear message instead of on the first acquisition.
        if !is_available() {
            anyhow::bail!("GeoClue2 is not reachable on the system D-Bus");
        }
        Ok(Self)
    }
}

/// Map a zbus error to the provider taxonomy.
///
/// GeoClue agents refuse unauthorized clients with AccessDenied on Start.
fn map_zbus_error(e: zbus::Error) -> ProviderError {
    if let zbus::Error::MethodError(ref name, _, _) = e
        && name.as_str().contains("AccessDenied")
    {
        return ProviderError::PermissionDenied;
    }
    ProviderError::Unavailable
}

/// Create, configure, and return a started client on a fresh connection.
fn start_client(
    options: &AcquireOptions,
) -> Result<(Connection, GeoClueClientProxyBlocking<'static>), ProviderError> {
    let connection = Connection::system().map_err(map_zbus_error)?;

    let manager = GeoClueManagerProxyBlocking::new(&connection).map_err(map_zbus_error)?;
    let client_path = manager.get_client().map_err(map_zbus_error)?;

    let client = GeoClueClientProxyBlocking::builder(&connection)
        .path(client_path)
        .map_err(map_zbus_error)?
        .build()
        .map_err(map_zbus_error)?;

    client
        .set_desktop_id("odometr")
        .map_err(map_zbus_error)?;
    let accuracy = if options.high_accuracy {
        ACCURACY_EXACT
    } else {
        ACCURACY_STREET
    };
    client
        .set_desired_accuracy_level(accuracy)
        .map_err(map_zbus_error)?;
    client
        .set_distance_threshold(options.min_distance_between_updates_meters)
        .map_err(map_zbus_error)?;

    client.start().map_err(map_zbus_error)?;
    Ok((connection, client))
}

/// Read a Fix out of a Location object path.
fn read_location(
    connection: &Connection,
    path: zbus::zvariant::ObjectPath<'_>,
) -> Result<Fix, ProviderError> {
    let location = GeoClueLocationProxyBlocking::builder(connection)
        .path(path.to_owned())
        .map_err(map_zbus_error)?
        .build()
        .map_err(map_zbus_error)?;

    let latitude = location.latitude().map_err(map_zbus_error)?;
    let longitude = location.longitude().map_err(map_zbus_error)?;

    let mut fix = Fix::new(latitude, longitude, crate::time_source::now_millis());
    // GeoClue reports unknown values as negative or zero sentinels; only
    // carry ones that look real.
    if let Ok(accuracy) = location.accuracy()
        && accuracy > 0.0
    {
        fix.accuracy_meters = Some(accuracy);
    }
    if let Ok(altitude) = location.altitude()
        && altitude > -1_000.0
    {
        fix.altitude_meters = Some(altitude);
    }
    if let Ok(speed) = location.speed()
        && speed >= 0.0
    {
        fix.speed_meters_per_second = Some(speed);
    }
    Ok(fix)
}

impl LocationProvider for GeoClueProvider {
    fn request_once(&self, options: &AcquireOptions) -> Result<Fix, ProviderError> {
        let options = options.clone();
        with_timeout(options.timeout, move || {
            let (connection, client) = start_client(&options)?;

            let mut updates = client
                .receive_location_updated()
                .map_err(map_zbus_error)?;

            let result = match updates.next() {
                Some(signal) => match signal.args() {
                    Ok(args) => read_location(&connection, args.new),
                    Err(_) => Err(ProviderError::Unavailable),
                },
                None => Err(ProviderError::Unavailable),
            };

            let _ = client.stop();
            result
        })
    }

    fn watch(&self, options: &AcquireOptions, sink: FixSink) -> Result<WatchHandle, ProviderError> {
        let (connection, client) = start_client(options)?;
        let mut updates = client.receive_location_updated().map_err(map_zbus_error)?;

        // The watch thread stays blocked on the signal stream between
        // updates; cancellation gates delivery off and lets the thread
        // unwind when the stream next yields or the connection drops.
        let (mut handle, watch_sink) = WatchHandle::new_pair(sink, false);
        let thread = std::thread::spawn(move || {
            while let Some(signal) = updates.next() {
                if watch_sink.is_cancelled() {
                    break;
                }
                let fix = match signal.args() {
                    Ok(args) => read_location(&connection, args.new),
                    Err(_) => continue,
                };
                match fix {
                    Ok(fix) => {
                        if !watch_sink.deliver(fix) {
                            break;
                        }
                    }
                    Err(e) => {
                        log_pipe!();
                        log_warning!("Dropped unreadable location update: {}", e);
                    }
                }
            }
            let _ = client.stop();
        });
        handle.attach(thread);
        Ok(handle)
    }

    fn provider_name(&self) -> &'static str {
        "GeoClue2"
    }
}
