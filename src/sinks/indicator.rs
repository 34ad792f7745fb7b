use std::{thread, time::Duration};

use log::info;

use super::traits::Sink;
use crate::{config::LedsCfg, error::SinkError, sensors::Batch, threshold::IndicatorState};

/// How long the rendered colours are held before the context is released.
pub const RENDER_HOLD: Duration = Duration::from_millis(15);

/// Opens the indicator hardware for the duration of one render.
pub trait IndicatorDriver: Send {
    /// Failure here is [`SinkError::ResourceUnavailable`].
    fn open(&self, channel_count: usize) -> Result<Box<dyn IndicatorContext + '_>, SinkError>;
}

/// Scoped access to the indicator hardware; released on drop.
pub trait IndicatorContext {
    /// Stages `0xRRGGBB` for `channel`.
    fn set(&mut self, channel: usize, rgb: u32);
    fn render(&mut self) -> Result<(), SinkError>;
}

/// Reorders a strip-native `0xGGRRBB` palette entry into `0xRRGGBB`.
pub const fn grb_to_rgb(grb: u32) -> u32 {
    let g = (grb >> 16) & 0xFF;
    let r = (grb >> 8) & 0xFF;
    let b = grb & 0xFF;
    (r << 16) | (g << 8) | b
}

/// Maps per-channel counts through a four-colour palette and renders them.
///
/// Palette entries are `0xGGRRBB`; drivers receive `0xRRGGBB`.
pub struct IndicatorSink {
    driver: Box<dyn IndicatorDriver>,
    palette: [u32; 4],
    hold: Duration,
}

impl IndicatorSink {
    pub fn new(driver: Box<dyn IndicatorDriver>, palette: [u32; 4]) -> Self {
        Self {
            driver,
            palette,
            hold: RENDER_HOLD,
        }
    }

    /// Picks the hardware driver compiled into this build.
    pub fn from_config(cfg: &LedsCfg) -> Self {
        #[cfg(feature = "ws281x")]
        let driver: Box<dyn IndicatorDriver> = Box::new(ws281x::Ws281xDriver::from_config(cfg));
        #[cfg(not(feature = "ws281x"))]
        let driver: Box<dyn IndicatorDriver> = Box::new(LoggingIndicator);

        Self::new(driver, cfg.palette)
    }

    #[cfg(test)]
    fn with_hold(mut self, hold: Duration) -> Self {
        self.hold = hold;
        self
    }

    /// `0xRRGGBB` for `count`; counts above the last palette index show the last colour.
    pub fn color_for(&self, count: usize) -> u32 {
        grb_to_rgb(self.palette[count.min(self.palette.len() - 1)])
    }

    /// Renders `state` directly, bypassing any batch.
    pub fn show(&self, state: &IndicatorState) -> Result<(), SinkError> {
        let mut ctx = self.driver.open(state.channel_count())?;
        for (channel, &count) in state.iter().enumerate() {
            ctx.set(channel, self.color_for(count));
        }
        ctx.render()?;
        thread::sleep(self.hold);
        info!("LED status:\t\t\t{:?}", state.as_slice());
        Ok(())
    }
}

impl Sink for IndicatorSink {
    fn name(&self) -> &'static str {
        "indicator"
    }

    fn publish(&mut self, _batch: &Batch, indicator: &IndicatorState) -> Result<(), SinkError> {
        self.show(indicator)
    }
}

/// Driver for hosts without indicator hardware: logs what would be shown.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingIndicator;

struct LoggingContext {
    colors: Vec<u32>,
}

impl IndicatorDriver for LoggingIndicator {
    fn open(&self, channel_count: usize) -> Result<Box<dyn IndicatorContext + '_>, SinkError> {
        Ok(Box::new(LoggingContext {
            colors: vec![0; channel_count],
        }))
    }
}

impl IndicatorContext for LoggingContext {
    fn set(&mut self, channel: usize, rgb: u32) {
        if let Some(slot) = self.colors.get_mut(channel) {
            *slot = rgb;
        }
    }

    fn render(&mut self) -> Result<(), SinkError> {
        let colors: Vec<String> = self.colors.iter().map(|c| format!("#{c:06X}")).collect();
        info!("Indicator colours: {}", colors.join(" "));
        Ok(())
    }
}

#[cfg(feature = "ws281x")]
mod ws281x {
    //! WS2811 strip on a Raspberry Pi PWM pin.

    use rs_ws281x::{ChannelBuilder, Controller, ControllerBuilder, StripType};

    use super::{IndicatorContext, IndicatorDriver};
    use crate::{config::LedsCfg, error::SinkError};

    pub struct Ws281xDriver {
        gpio: i32,
        dma: i32,
        frequency_hz: u32,
        brightness: u8,
        invert: bool,
    }

    impl Ws281xDriver {
        pub fn from_config(cfg: &LedsCfg) -> Self {
            Self {
                gpio: cfg.gpio,
                dma: cfg.dma,
                frequency_hz: cfg.frequency_hz,
                brightness: cfg.brightness,
                invert: cfg.invert,
            }
        }
    }

    struct Ws281xContext {
        controller: Controller,
    }

    impl IndicatorDriver for Ws281xDriver {
        fn open(
            &self,
            channel_count: usize,
        ) -> Result<Box<dyn IndicatorContext + '_>, SinkError> {
            let count = i32::try_from(channel_count)
                .map_err(|_| SinkError::ResourceUnavailable("too many LEDs".into()))?;
            let controller = ControllerBuilder::new()
                .freq(self.frequency_hz)
                .dma(self.dma)
                .channel(
                    0,
                    ChannelBuilder::new()
                        .pin(self.gpio)
                        .count(count)
                        .strip_type(StripType::Ws2811Grb)
                        .brightness(self.brightness)
                        .invert(self.invert)
                        .build(),
                )
                .build()
                .map_err(|e| SinkError::ResourceUnavailable(format!("ws2811 init: {e:?}")))?;
            Ok(Box::new(Ws281xContext { controller }))
        }
    }

    impl IndicatorContext for Ws281xContext {
        fn set(&mut self, channel: usize, rgb: u32) {
            let [_, r, g, b] = rgb.to_be_bytes();
            if let Some(led) = self.controller.leds_mut(0).get_mut(channel) {
                *led = [b, g, r, 0];
            }
        }

        fn render(&mut self) -> Result<(), SinkError> {
            self.controller
                .render()
                .map_err(|e| SinkError::Render(format!("ws2811 render: {e:?}")))
        }
    }
}
