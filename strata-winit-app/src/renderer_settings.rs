use ash::vk;
use strata_crate_tools::config::{PresentModeConfig, RendererConfig, SurfaceFormatConfig};
use strata_render_graph::settings::RendererSettings;

/// 将配置文件中的字符串枚举转换为 vulkan 类型
pub fn renderer_settings(config: &RendererConfig) -> anyhow::Result<RendererSettings> {
    let present_mode = match config.present_mode {
        PresentModeConfig::Mailbox => vk::PresentModeKHR::MAILBOX,
        PresentModeConfig::Fifo => vk::PresentModeKHR::FIFO,
        PresentModeConfig::Immediate => vk::PresentModeKHR::IMMEDIATE,
    };
    let format = match config.surface_format {
        SurfaceFormatConfig::Bgra8Srgb => vk::Format::B8G8R8A8_SRGB,
        SurfaceFormatConfig::Rgba8Srgb => vk::Format::R8G8B8A8_SRGB,
        SurfaceFormatConfig::A2b10g10r10 => vk::Format::A2B10G10R10_UNORM_PACK32,
    };
    let msaa_samples = match config.msaa_samples {
        1 => vk::SampleCountFlags::TYPE_1,
        2 => vk::SampleCountFlags::TYPE_2,
        4 => vk::SampleCountFlags::TYPE_4,
        8 => vk::SampleCountFlags::TYPE_8,
        n => anyhow::bail!("unsupported msaa sample count: {}", n),
    };

    Ok(RendererSettings {
        frame_slots: config.frame_slots,
        surface_format: vk::SurfaceFormatKHR {
            format,
            color_space: vk::ColorSpaceKHR::SRGB_NONLINEAR,
        },
        present_mode,
        msaa_samples,
        clear_color: config.clear_color,
        ..Default::default()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_default_settings() {
        let settings = renderer_settings(&RendererConfig::default()).unwrap();
        let default = RendererSettings::default();
        assert_eq!(settings.frame_slots, default.frame_slots);
        assert_eq!(settings.surface_format.format, default.surface_format.format);
        assert_eq!(settings.present_mode, default.present_mode);
        assert_eq!(settings.msaa_samples, default.msaa_samples);
    }

    #[test]
    fn test_conversion() {
        let config = RendererConfig {
            present_mode: PresentModeConfig::Fifo,
            surface_format: SurfaceFormatConfig::Bgra8Srgb,
            msaa_samples: 4,
            ..Default::default()
        };
        let settings = renderer_settings(&config).unwrap();
        assert_eq!(settings.present_mode, vk::PresentModeKHR::FIFO);
        assert_eq!(settings.surface_format.format, vk::Format::B8G8R8A8_SRGB);
        assert_eq!(settings.msaa_samples, vk::SampleCountFlags::TYPE_4);

        let config = RendererConfig {
            msaa_samples: 3,
            ..Default::default()
        };
        assert!(renderer_settings(&config).is_err());
    }
}
