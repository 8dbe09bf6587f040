use cortex_m::interrupt;
use cortex_m::register::primask;
use critical_section::{self, RawRestoreState};
use defmt_rtt as _;
use embassy_executor::Spawner;
use embassy_stm32 as hal;
use embassy_stm32::gpio::{Level, Output, Speed};
use embassy_stm32::i2c::{Config as I2cConfig, I2c};
use embassy_stm32::mode::Blocking;
use embassy_stm32::time::Hertz;
use embassy_time::{Duration, Timer};
use sentry_core::calibration::{CalibrationAccumulator, CalibrationError, CalibrationSettings};
use sentry_core::config::ControllerConfig;
use sentry_core::io::AccelerationSource;
use sentry_core::motion::{AccelRange, CalibrationOffset};
use sentry_core::scheduler::ControlLoop;

use crate::clock::{FirmwareInstant, core_duration_to_embassy};
use crate::control::Outputs;
use crate::hw::accel::{DEFAULT_ADDRESS, Mpu6050};
use crate::hw::{AlertLed, RgbLed};
use crate::link::{LinkClient, ReplyQueue, RequestQueue};
use crate::telemetry::{log_calibration_failed, log_calibration_started, log_sensor_init_failed};

mod control_task;
mod link_task;

critical_section::set_impl!(InterruptCriticalSection);

struct InterruptCriticalSection;

unsafe impl critical_section::Impl for InterruptCriticalSection {
    unsafe fn acquire() -> RawRestoreState {
        let primask = primask::read();
        interrupt::disable();
        primask.is_active()
    }

    unsafe fn release(restore_state: RawRestoreState) {
        if restore_state {
            unsafe {
                interrupt::enable();
            }
        }
    }
}

type Sensor = Mpu6050<I2c<'static, Blocking>>;
type BoardOutputs = Outputs<RgbLed<Output<'static>>, AlertLed<Output<'static>>>;

const SENSOR_I2C_HZ: u32 = 400_000;
const CALIBRATION_RETRY: Duration = Duration::from_secs(1);

pub(super) static REQUEST_QUEUE: RequestQueue = RequestQueue::new();
pub(super) static REPLY_QUEUE: ReplyQueue = ReplyQueue::new();

#[embassy_executor::main]
pub async fn main(spawner: Spawner) {
    let config = ControllerConfig::default();
    let hal::Peripherals {
        PA5,
        PA6,
        PA7,
        PA8,
        PB0,
        PB1,
        PB6,
        PB7,
        I2C1,
        USART5,
        ..
    } = hal::init(hal::Config::default());

    let mut outputs = Outputs {
        indicator: RgbLed::new(
            Output::new(PA6, Level::Low, Speed::Low),
            Output::new(PA7, Level::Low, Speed::Low),
            Output::new(PA8, Level::Low, Speed::Low),
        ),
        alert: AlertLed::new(Output::new(PA5, Level::Low, Speed::Low)),
    };

    let mut i2c_config = I2cConfig::default();
    i2c_config.frequency = Hertz(SENSOR_I2C_HZ);
    let i2c = I2c::new_blocking(I2C1, PB6, PB7, i2c_config);
    let mut sensor = Mpu6050::new(i2c, DEFAULT_ADDRESS, AccelRange::G2);

    let offset = calibrate_until_ready(&mut sensor, config.calibration).await;

    let control = ControlLoop::new(config, offset, FirmwareInstant::now())
        .expect("default controller config is valid");
    control
        .indicator_state()
        .drive(&mut outputs.indicator, &mut outputs.alert);

    spawner
        .spawn(link_task::run(
            USART5,
            PB0,
            PB1,
            REQUEST_QUEUE.receiver(),
            REPLY_QUEUE.sender(),
            config.io_timeout,
        ))
        .expect("failed to spawn link task");

    spawner
        .spawn(control_task::run(
            control,
            sensor,
            outputs,
            LinkClient::new(REQUEST_QUEUE.sender()),
            REPLY_QUEUE.receiver(),
        ))
        .expect("failed to spawn control task");

    core::future::pending::<()>().await;
}

/// Motion evaluation needs an offset, so keep trying until one is produced.
async fn calibrate_until_ready(
    sensor: &mut Sensor,
    settings: CalibrationSettings,
) -> CalibrationOffset {
    loop {
        if let Err(err) = sensor.init() {
            log_sensor_init_failed(err);
            Timer::after(CALIBRATION_RETRY).await;
            continue;
        }

        log_calibration_started(settings.samples.get());
        match calibrate(sensor, settings).await {
            Ok(offset) => return offset,
            Err(err) => {
                log_calibration_failed(err);
                Timer::after(CALIBRATION_RETRY).await;
            }
        }
    }
}

async fn calibrate<S: AccelerationSource>(
    sensor: &mut S,
    settings: CalibrationSettings,
) -> Result<CalibrationOffset, CalibrationError> {
    let spacing = core_duration_to_embassy(settings.spacing);
    let mut accumulator = CalibrationAccumulator::new();
    for _ in 0..settings.samples.get() {
        accumulator.record(sensor.read_acceleration());
        Timer::after(spacing).await;
    }
    accumulator.finish()
}
