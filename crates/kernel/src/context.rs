use types::ProcessImage;

use crate::config::KernelOptions;
use crate::frontend::Frontend;
use crate::platform::Platform;

/// All boot state, threaded through the boot sequence by reference and
/// finally moved into the program by the handoff.
pub struct KernelContext<P: Platform> {
    pub machine: P::Machine,
    pub frontend: &'static Frontend<P::Transport, P::Clock>,
    pub paging: P::Paging,
    pub loader: P::Loader,
    pub options: KernelOptions,
    pub image: ProcessImage,
    /// The core accepted the requested translation mode.
    pub have_vm: bool,
    pub mem_size: u64,
    pub kstack_top: u64,
}

impl<P: Platform> KernelContext<P> {
    pub fn new(
        machine: P::Machine,
        frontend: &'static Frontend<P::Transport, P::Clock>,
        paging: P::Paging,
        loader: P::Loader,
    ) -> Self {
        Self {
            machine,
            frontend,
            paging,
            loader,
            options: KernelOptions::new(),
            image: ProcessImage::new(),
            have_vm: true,
            mem_size: 0,
            kstack_top: 0,
        }
    }
}
