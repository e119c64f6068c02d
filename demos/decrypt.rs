use std::fs::File;

use ctrkit::Result;
use ctrkit::keys::KeySet;
use ctrkit::sdmc::SdmcDecryptor;

fn main() -> Result<()> {
    let mut keys = KeySet::new();
    keys.load_keys(File::open("ctr.keys")?)?;

    let sd_path = "/title/00040000/00164800/content/00000000.app";
    let decryptor = SdmcDecryptor::new("sdmc/Nintendo 3DS/id0/id1", &keys)?;

    let size = decryptor.open_file(sd_path)?.size()?;
    decryptor.reset(size);
    decryptor.decrypt_and_write_file(sd_path, "out/00000000.app", |imported, total| {
        println!("{imported}/{total}");
    })?;

    Ok(())
}
