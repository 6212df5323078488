fn main() {
    const MIN_THREADS: usize = 1;
    let num_threads =
        std::thread::available_parallelism().map_or(MIN_THREADS, core::num::NonZeroUsize::get);
    println!("cargo:rustc-env=THREAD_COUNT={num_threads}");

    // SAFETY: _SC_PAGESIZE is a constant query with no preconditions.
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    println!("cargo:rustc-env=PARAWALK_PAGE_SIZE={page_size}");
}
