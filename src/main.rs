fn main() -> anyhow::Result<()> {
    phonograph_lib::run()
}
