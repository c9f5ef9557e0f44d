// texture_convert.rs - DDJ to DDS conversion

use jmx_formats::texture::convert_file;

use crate::TextureArgs;
use crate::batch::run_batch;
use crate::settings::Settings;

pub fn run_texture(args: TextureArgs, settings: &Settings) -> anyhow::Result<()> {
    let overwrite = args.overwrite || settings.overwrite;
    if let Some(dir) = &args.output_dir {
        std::fs::create_dir_all(dir)?;
    }

    run_batch("texture", &args.files, |path| {
        convert_file(path, args.output_dir.as_deref(), overwrite)?;
        Ok(())
    })?;
    Ok(())
}
