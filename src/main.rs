fn main() {
    fieldvisit_lib::run()
}
